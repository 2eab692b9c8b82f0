//! Pointer, wheel and drop handling for the workflow canvas.
//!
//! `CanvasInteraction` owns the selection and the single active
//! interaction mode. It turns raw screen-space events into geometry calls
//! and graph store mutations, and reports what changed so the owner can
//! invalidate derived state.
//!
//! Once a drag or pan starts the pointer may leave the canvas widget, so
//! move/up events have to come from the window. Front ends subscribe to
//! window-level pointer events while `is_capturing()` is true; the
//! `PointerCapture` guard behind it is acquired when a gesture starts and
//! dropped on the gesture's only exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::geometry::{screen_to_canvas, step_at, CanvasView, Point};
use crate::workflow::{GraphStore, Step, StepType};

/// Drag-and-drop key under which palette entries publish their step type.
pub const STEP_TYPE_MIME: &str = "application/x-werkbank-step-type";

/// Counts window-level pointer subscriptions currently held.
#[derive(Debug, Clone, Default)]
pub struct WindowListeners {
    active: Arc<AtomicUsize>,
}

impl WindowListeners {
    pub fn acquire(&self) -> PointerCapture {
        self.active.fetch_add(1, Ordering::SeqCst);
        PointerCapture {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Held for the lifetime of one gesture; releases its listener slot on drop.
#[derive(Debug)]
pub struct PointerCapture {
    active: Arc<AtomicUsize>,
}

impl Drop for PointerCapture {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum InteractionMode {
    #[default]
    Idle,
    Panning {
        origin: Point,
        start_view: CanvasView,
        /// Linking source to return to once the pan ends.
        resume_linking: Option<String>,
    },
    DraggingStep {
        step_id: String,
        /// Pointer position inside the node, in canvas units.
        grab_offset: Point,
    },
    LinkingFrom(String),
}

/// What an event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outcome {
    pub graph_changed: bool,
    pub view_changed: bool,
    pub selection_changed: bool,
}

impl Outcome {
    fn graph(changed: bool) -> Self {
        Self {
            graph_changed: changed,
            ..Self::default()
        }
    }

    fn view(changed: bool) -> Self {
        Self {
            view_changed: changed,
            ..Self::default()
        }
    }

    fn selection(changed: bool) -> Self {
        Self {
            selection_changed: changed,
            ..Self::default()
        }
    }
}

/// Platform drag-and-drop payload: MIME key to string value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropData {
    entries: HashMap<String, String>,
}

impl DropData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_step_type(step_type: StepType) -> Self {
        Self::new().with(STEP_TYPE_MIME, step_type.as_str())
    }

    pub fn with(mut self, mime: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(mime.into(), value.into());
        self
    }

    pub fn get(&self, mime: &str) -> Option<&str> {
        self.entries.get(mime).map(String::as_str)
    }

    pub fn step_type(&self) -> Option<StepType> {
        self.get(STEP_TYPE_MIME)?.parse().ok()
    }
}

#[derive(Debug, Default)]
pub struct CanvasInteraction {
    mode: InteractionMode,
    selected: Option<String>,
    listeners: WindowListeners,
    capture: Option<PointerCapture>,
}

impl CanvasInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &InteractionMode {
        &self.mode
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Source step of a pending link, including one suspended by a pan.
    pub fn linking_from(&self) -> Option<&str> {
        match &self.mode {
            InteractionMode::LinkingFrom(id) => Some(id),
            InteractionMode::Panning {
                resume_linking: Some(id),
                ..
            } => Some(id),
            _ => None,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn listeners(&self) -> &WindowListeners {
        &self.listeners
    }

    pub fn select(&mut self, step_id: Option<String>) -> bool {
        if self.selected == step_id {
            return false;
        }
        trace!(selected = ?step_id, "selection changed");
        self.selected = step_id;
        true
    }

    pub fn pointer_down(
        &mut self,
        screen: Point,
        store: &mut GraphStore,
        view: &CanvasView,
    ) -> Outcome {
        let canvas = view.to_canvas(screen);
        let hit = step_at(store.definition(), canvas).map(|step| (step.id.clone(), step.position));

        if let InteractionMode::LinkingFrom(source) = &self.mode {
            let source = source.clone();
            return match hit {
                Some((target, _)) => self.complete_link(source, target, store),
                None => {
                    self.begin_gesture(InteractionMode::Panning {
                        origin: screen,
                        start_view: *view,
                        resume_linking: Some(source),
                    });
                    Outcome::default()
                }
            };
        }

        match hit {
            Some((step_id, position)) => {
                let changed = self.select(Some(step_id.clone()));
                let (dx, dy) = canvas.delta(position);
                debug!(step = %step_id, "drag started");
                self.begin_gesture(InteractionMode::DraggingStep {
                    step_id,
                    grab_offset: Point::new(dx, dy),
                });
                Outcome::selection(changed)
            }
            None => {
                let changed = self.select(None);
                self.begin_gesture(InteractionMode::Panning {
                    origin: screen,
                    start_view: *view,
                    resume_linking: None,
                });
                Outcome::selection(changed)
            }
        }
    }

    pub fn pointer_move(
        &mut self,
        screen: Point,
        store: &mut GraphStore,
        view: &mut CanvasView,
    ) -> Outcome {
        match &self.mode {
            InteractionMode::Panning {
                origin, start_view, ..
            } => {
                let (dx, dy) = screen.delta(*origin);
                let next = CanvasView {
                    x: start_view.x + dx,
                    y: start_view.y + dy,
                    zoom: view.zoom,
                };
                let changed = next != *view;
                *view = next;
                Outcome::view(changed)
            }
            InteractionMode::DraggingStep {
                step_id,
                grab_offset,
            } => {
                let pointer = view.to_canvas(screen);
                let target = Point::new(pointer.x - grab_offset.x, pointer.y - grab_offset.y);
                Outcome::graph(store.move_step(step_id, target))
            }
            InteractionMode::Idle | InteractionMode::LinkingFrom(_) => Outcome::default(),
        }
    }

    /// Ends a pan or drag wherever the pointer is released.
    pub fn pointer_up(&mut self) -> Outcome {
        let next = match std::mem::take(&mut self.mode) {
            InteractionMode::Panning { resume_linking, .. } => {
                resume_linking.map_or(InteractionMode::Idle, InteractionMode::LinkingFrom)
            }
            InteractionMode::DraggingStep { step_id, .. } => {
                debug!(step = %step_id, "drag finished");
                InteractionMode::Idle
            }
            other => other,
        };
        self.mode = next;
        self.capture = None;
        Outcome::default()
    }

    /// One wheel notch; independent of the current mode.
    pub fn wheel(&mut self, delta_y: f32, view: &mut CanvasView) -> Outcome {
        let before = view.zoom;
        view.zoom_by_wheel(delta_y);
        Outcome::view(view.zoom != before)
    }

    /// Adds a step for a palette drop. Drops without a step-type payload
    /// are ignored.
    pub fn drop_payload(
        &mut self,
        data: &DropData,
        screen: Point,
        store: &mut GraphStore,
        view: &CanvasView,
    ) -> Option<Step> {
        let Some(step_type) = data.step_type() else {
            trace!("ignored drop without step type payload");
            return None;
        };
        let position = screen_to_canvas(screen, view);
        Some(store.add_step(step_type, Some(position)))
    }

    pub fn start_linking(&mut self, step_id: &str, store: &GraphStore) -> bool {
        if store.step(step_id).is_none() {
            return false;
        }
        self.capture = None;
        self.mode = InteractionMode::LinkingFrom(step_id.to_string());
        debug!(step = step_id, "linking started");
        true
    }

    pub fn cancel_linking(&mut self) -> bool {
        if let InteractionMode::LinkingFrom(_) = self.mode {
            self.mode = InteractionMode::Idle;
            return true;
        }
        if let InteractionMode::Panning { resume_linking, .. } = &mut self.mode {
            return resume_linking.take().is_some();
        }
        false
    }

    /// Drops every reference to a deleted step.
    pub fn forget_step(&mut self, step_id: &str) {
        if self.selected.as_deref() == Some(step_id) {
            self.selected = None;
        }
        let stale = match &self.mode {
            InteractionMode::LinkingFrom(id) => id == step_id,
            InteractionMode::DraggingStep { step_id: id, .. } => id == step_id,
            _ => false,
        };
        if stale {
            self.mode = InteractionMode::Idle;
            self.capture = None;
        }
        if let InteractionMode::Panning { resume_linking, .. } = &mut self.mode {
            if resume_linking.as_deref() == Some(step_id) {
                *resume_linking = None;
            }
        }
    }

    /// Back to idle with nothing selected, e.g. after loading another workflow.
    pub fn reset(&mut self) {
        self.mode = InteractionMode::Idle;
        self.selected = None;
        self.capture = None;
    }

    fn begin_gesture(&mut self, mode: InteractionMode) {
        // Release a stale capture before taking the new one.
        self.capture = None;
        self.mode = mode;
        self.capture = Some(self.listeners.acquire());
    }

    fn complete_link(&mut self, source: String, target: String, store: &mut GraphStore) -> Outcome {
        self.mode = InteractionMode::Idle;
        if source == target {
            debug!(step = %source, "linking cancelled on source step");
            return Outcome::default();
        }
        let created = store.create_edge(&source, &target).is_some();
        let selection_changed = self.select(Some(target));
        Outcome {
            graph_changed: created,
            selection_changed,
            ..Outcome::default()
        }
    }
}
