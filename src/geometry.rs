//! Coordinate math for the workflow canvas.
//!
//! Step positions live in canvas space: a fixed `CANVAS_SIZE` square that is
//! independent of pan and zoom. Pointer events arrive in screen space
//! (relative to the canvas widget origin). The whole paint layer is drawn
//! through a single `translate(view.x, view.y) scale(view.zoom)` transform,
//! so only the pointer path ever needs the inverse mapping.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::workflow::{Step, WorkflowDefinition};

pub const CANVAS_SIZE: f32 = 4000.0;
pub const NODE_WIDTH: f32 = 220.0;
pub const NODE_HEIGHT: f32 = 96.0;

pub const MIN_ZOOM: f32 = 0.4;
pub const MAX_ZOOM: f32 = 2.5;
pub const ZOOM_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn delta(self, other: Point) -> (f32, f32) {
        (self.x - other.x, self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Pan offset (screen pixels) and zoom factor of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasView {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for CanvasView {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl CanvasView {
    /// Screen point to canvas point without clamping. Used for hit-testing,
    /// where a pointer outside the canvas must not snap onto an edge node.
    pub fn to_canvas(&self, screen: Point) -> Point {
        Point::new((screen.x - self.x) / self.zoom, (screen.y - self.y) / self.zoom)
    }

    pub fn to_screen(&self, canvas: Point) -> Point {
        Point::new(canvas.x * self.zoom + self.x, canvas.y * self.zoom + self.y)
    }

    /// Applies one wheel notch. Negative `delta_y` (scrolling up) zooms in.
    pub fn zoom_by_wheel(&mut self, delta_y: f32) {
        if delta_y == 0.0 || delta_y.is_nan() {
            return;
        }
        let step = if delta_y < 0.0 { ZOOM_STEP } else { -ZOOM_STEP };
        self.zoom = clamp_zoom(self.zoom + step);
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = clamp_zoom(zoom);
    }
}

pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}

pub fn clamp_zoom(zoom: f32) -> f32 {
    // f32 accumulation drifts (1.0 + 15 * 0.1 != 2.5), so round to the step grid first.
    let rounded = (zoom * 100.0).round() / 100.0;
    clamp(rounded, MIN_ZOOM, MAX_ZOOM)
}

/// Keeps a node's top-left corner inside the canvas.
pub fn clamp_position(point: Point) -> Point {
    let x = if point.x.is_finite() { point.x } else { 0.0 };
    let y = if point.y.is_finite() { point.y } else { 0.0 };
    Point::new(
        clamp(x, 0.0, CANVAS_SIZE - NODE_WIDTH),
        clamp(y, 0.0, CANVAS_SIZE - NODE_HEIGHT),
    )
}

pub fn screen_to_canvas(client: Point, view: &CanvasView) -> Point {
    clamp_position(view.to_canvas(client))
}

pub fn canvas_to_screen(canvas: Point, view: &CanvasView) -> Point {
    view.to_screen(canvas)
}

pub fn step_center(step: &Step) -> Point {
    step.position.offset(NODE_WIDTH / 2.0, NODE_HEIGHT / 2.0)
}

pub fn step_bounds(step: &Step) -> Rect {
    Rect {
        x: step.position.x,
        y: step.position.y,
        width: NODE_WIDTH,
        height: NODE_HEIGHT,
    }
}

/// Topmost step under a canvas-space point. Later steps paint over earlier
/// ones, so the search runs back to front.
pub fn step_at(definition: &WorkflowDefinition, point: Point) -> Option<&Step> {
    definition
        .steps
        .iter()
        .rev()
        .find(|step| step_bounds(step).contains(point))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepType;

    #[test]
    fn screen_to_canvas_inverts_pan_and_zoom() {
        let view = CanvasView {
            x: 100.0,
            y: 50.0,
            zoom: 2.0,
        };
        let point = screen_to_canvas(Point::new(500.0, 450.0), &view);
        assert_eq!(point, Point::new(200.0, 200.0));
        assert_eq!(canvas_to_screen(point, &view), Point::new(500.0, 450.0));
    }

    #[test]
    fn screen_to_canvas_clamps_to_canvas_bounds() {
        let view = CanvasView::default();
        assert_eq!(screen_to_canvas(Point::new(-300.0, -1.0), &view), Point::ORIGIN);
        assert_eq!(
            screen_to_canvas(Point::new(1.0e7, 1.0e7), &view),
            Point::new(CANVAS_SIZE - NODE_WIDTH, CANVAS_SIZE - NODE_HEIGHT)
        );
    }

    #[test]
    fn clamp_position_rejects_non_finite_input() {
        assert_eq!(clamp_position(Point::new(f32::NAN, f32::INFINITY)), Point::ORIGIN);
    }

    #[test]
    fn wheel_zoom_stays_in_bounds() {
        let mut view = CanvasView::default();
        for _ in 0..50 {
            view.zoom_by_wheel(-120.0);
        }
        assert_eq!(view.zoom, MAX_ZOOM);
        for _ in 0..50 {
            view.zoom_by_wheel(120.0);
        }
        assert_eq!(view.zoom, MIN_ZOOM);
    }

    #[test]
    fn zero_wheel_delta_is_ignored() {
        let mut view = CanvasView::default();
        view.zoom_by_wheel(0.0);
        assert_eq!(view.zoom, 1.0);
    }

    #[test]
    fn hit_test_prefers_topmost_step() {
        let mut definition = WorkflowDefinition::default();
        let mut first = Step::new("a", StepType::Script);
        first.position = Point::new(100.0, 100.0);
        let mut second = Step::new("b", StepType::Delay);
        second.position = Point::new(150.0, 120.0);
        definition.steps = vec![first, second];

        assert_eq!(step_at(&definition, Point::new(160.0, 130.0)).map(|s| s.id.as_str()), Some("b"));
        assert_eq!(step_at(&definition, Point::new(110.0, 110.0)).map(|s| s.id.as_str()), Some("a"));
        assert!(step_at(&definition, Point::new(10.0, 10.0)).is_none());
    }

    #[test]
    fn step_center_offsets_by_half_node() {
        let mut step = Step::new("a", StepType::AgentTask);
        step.position = Point::new(180.0, 140.0);
        assert_eq!(
            step_center(&step),
            Point::new(180.0 + NODE_WIDTH / 2.0, 140.0 + NODE_HEIGHT / 2.0)
        );
    }
}
