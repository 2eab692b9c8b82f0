use std::fs;
use std::sync::Arc;

use iced::widget::{
    button, canvas, column, container, horizontal_space, pick_list, row, scrollable, text,
    text_editor, text_input, Canvas, Column,
};
use iced::{
    alignment, event, executor, keyboard, mouse, Application, Color, Command, Element, Length,
    Rectangle, Renderer, Settings, Size, Subscription, Theme, Vector,
};
use werkbank::config::{self, EditorConfig};
use werkbank::geometry::{self as geo, CanvasView, NODE_HEIGHT, NODE_WIDTH};
use werkbank::interaction::InteractionMode;
use werkbank::panel::{fallback_candidates, parse_count_input, Choice};
use werkbank::{
    AgentDefinition, AgentSelector, DropData, HttpWorkflowService, IssueOverlay, Notice,
    NoticeLevel, PanelEdit, SaveRequest, ServiceError, Severity, StepType, ValidationRequest, ValidationResult,
    Variable, Workflow, WorkflowBuilder, WorkflowDefinition, WorkflowService,
};

const GRID: f32 = 40.0;
const MAX_TOASTS: usize = 4;

fn main() -> iced::Result {
    config::init_tracing(config::DEFAULT_LOG_FILTER);

    if !display_available() {
        return Ok(());
    }

    let config = match EditorConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return Ok(());
        }
    };
    let service: Arc<dyn WorkflowService> = match HttpWorkflowService::new(&config.api_url) {
        Ok(service) => Arc::new(service),
        Err(err) => {
            eprintln!("failed to create workflow service client: {err}");
            return Ok(());
        }
    };

    WorkflowEditor::run(Settings {
        antialiasing: true,
        ..Settings::with_flags(service)
    })
}

fn display_available() -> bool {
    if cfg!(not(target_os = "linux")) {
        return true;
    }
    if std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some() {
        return true;
    }
    eprintln!(
        "No display found (neither DISPLAY nor WAYLAND_DISPLAY set). \
         Start an X11/Wayland session or run under Xvfb, e.g. \
         `Xvfb :99 -screen 0 1280x720x24 & DISPLAY=:99 cargo run --features gui --bin workflow_editor`."
    );
    false
}

struct WorkflowEditor {
    builder: WorkflowBuilder,
    service: Arc<dyn WorkflowService>,
    /// Window position of the canvas' top-left corner, captured on press.
    canvas_origin: Vector,
    armed: Option<StepType>,
    bindings: text_editor::Content,
    bindings_step: Option<String>,
    file_path: String,
    open_id: String,
    new_variable: String,
    toasts: Vec<Notice>,
}

#[derive(Debug, Clone)]
enum Message {
    NameChanged(String),
    DescriptionChanged(String),
    AddStep(StepType),
    ArmDrop(StepType),
    CanvasPressed { local: iced::Point, origin: Vector },
    PointerMoved(iced::Point),
    PointerReleased,
    Wheel(f32),
    DeleteSelected,
    StartLinking,
    CancelLinking,
    Edit(PanelEdit),
    TimeoutInput(String),
    RetriesInput(String),
    BindingsAction(text_editor::Action),
    DeleteEdge(String),
    NewVariableChanged(String),
    AddVariable,
    RemoveVariable(usize),
    Validate,
    Validated(ValidationRequest, Result<ValidationResult, Arc<ServiceError>>),
    Save,
    Saved(SaveRequest, Result<Workflow, Arc<ServiceError>>),
    OpenIdChanged(String),
    Open,
    Opened(Result<Workflow, Arc<ServiceError>>),
    AgentsLoaded(Option<Vec<AgentDefinition>>),
    FilePathChanged(String),
    Import,
    Export,
    DismissToasts,
}

impl Application for WorkflowEditor {
    type Executor = executor::Default;
    type Theme = Theme;
    type Flags = Arc<dyn WorkflowService>;
    type Message = Message;

    fn new(service: Self::Flags) -> (Self, Command<Message>) {
        let editor = WorkflowEditor {
            builder: WorkflowBuilder::new(),
            service: Arc::clone(&service),
            canvas_origin: Vector::new(0.0, 0.0),
            armed: None,
            bindings: text_editor::Content::new(),
            bindings_step: None,
            file_path: "workflow.yaml".to_string(),
            open_id: String::new(),
            new_variable: String::new(),
            toasts: Vec::new(),
        };
        let load_agents = Command::perform(
            async move { service.list_agent_definitions().await.ok() },
            Message::AgentsLoaded,
        );
        (editor, load_agents)
    }

    fn title(&self) -> String {
        match self.builder.name().trim() {
            "" => "werkbank workflow editor".to_string(),
            name => format!("{name} - werkbank"),
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let shortcuts = keyboard::on_key_press(shortcut);
        // Window-level pointer tracking exists only while a pan or drag is in progress.
        if self.builder.interaction().is_capturing() {
            Subscription::batch([shortcuts, event::listen_with(window_pointer)])
        } else {
            shortcuts
        }
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        let command = self.handle(message);
        self.sync_bindings_editor();
        for notice in self.builder.drain_notices() {
            self.toasts.push(notice);
        }
        if self.toasts.len() > MAX_TOASTS {
            let excess = self.toasts.len() - MAX_TOASTS;
            self.toasts.drain(..excess);
        }
        command
    }

    fn view(&self) -> Element<'_, Message> {
        let overlay = self.builder.overlay();

        let canvas_view: Element<Message> = Canvas::new(GraphView {
            builder: &self.builder,
            armed: self.armed,
        })
        .width(Length::Fill)
        .height(Length::Fill)
        .into();

        let left_panel = scrollable(
            column![self.workflow_controls(), self.palette(), self.variables_view()].spacing(16),
        )
        .width(Length::Fixed(260.0));

        let right_panel = scrollable(
            column![self.inspector_view(&overlay), self.workflow_issues_view(&overlay)].spacing(16),
        )
        .width(Length::Fixed(340.0));

        let content = row![left_panel, canvas_view, right_panel]
            .spacing(8)
            .height(Length::Fill);

        container(column![content, self.status_bar()].spacing(8))
            .padding(8)
            .into()
    }
}

impl WorkflowEditor {
    fn handle(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::NameChanged(name) => self.builder.set_name(name),
            Message::DescriptionChanged(description) => self.builder.set_description(description),
            Message::AddStep(step_type) => {
                self.armed = None;
                self.builder.add_step(step_type);
            }
            Message::ArmDrop(step_type) => {
                self.armed = match self.armed {
                    Some(current) if current == step_type => None,
                    _ => Some(step_type),
                };
            }
            Message::CanvasPressed { local, origin } => {
                self.canvas_origin = origin;
                let screen = to_model(local);
                match self.armed.take() {
                    Some(step_type) => {
                        self.builder
                            .drop_step(&DropData::for_step_type(step_type), screen);
                    }
                    None => {
                        self.builder.pointer_down(screen);
                    }
                }
            }
            Message::PointerMoved(position) => {
                let local = position - self.canvas_origin;
                self.builder.pointer_move(to_model(local));
            }
            Message::PointerReleased => {
                self.builder.pointer_up();
            }
            Message::Wheel(delta_y) => {
                self.builder.wheel(delta_y);
            }
            Message::DeleteSelected => {
                self.builder.delete_selected();
            }
            Message::StartLinking => {
                self.builder.start_linking();
            }
            Message::CancelLinking => {
                self.armed = None;
                self.builder.cancel_linking();
            }
            Message::Edit(edit) => {
                self.builder.edit_step(edit);
            }
            Message::TimeoutInput(value) => {
                if let Some(timeout) = parse_count_input(&value) {
                    self.builder.edit_step(PanelEdit::TimeoutSeconds(timeout));
                }
            }
            Message::RetriesInput(value) => {
                if let Some(retries) = parse_count_input(&value) {
                    self.builder.edit_step(PanelEdit::Retries(retries));
                }
            }
            Message::BindingsAction(action) => {
                let edits = action.is_edit();
                self.bindings.perform(action);
                if edits {
                    self.builder.edit_bindings(self.bindings.text());
                }
            }
            Message::DeleteEdge(id) => {
                self.builder.delete_edge(&id);
            }
            Message::NewVariableChanged(name) => self.new_variable = name,
            Message::AddVariable => {
                let name = self.new_variable.trim();
                if !name.is_empty() {
                    self.builder.add_variable(Variable::new(name));
                    self.new_variable.clear();
                }
            }
            Message::RemoveVariable(index) => {
                self.builder.remove_variable(index);
            }
            Message::Validate => {
                let request = self.builder.begin_validate();
                let service = Arc::clone(&self.service);
                let definition = Arc::clone(&request.definition);
                return Command::perform(
                    async move { service.validate(&definition).await.map_err(Arc::new) },
                    move |result| Message::Validated(request, result),
                );
            }
            Message::Validated(request, result) => {
                self.builder
                    .finish_validate(&request, result.map_err(unshare));
            }
            Message::Save => {
                let Some(request) = self.builder.begin_save() else {
                    return Command::none();
                };
                let service = Arc::clone(&self.service);
                let workflow_id = request.workflow_id.clone();
                let payload = request.payload.clone();
                return Command::perform(
                    async move {
                        let result = match &workflow_id {
                            Some(id) => service.update_workflow(id, &payload).await,
                            None => service.create_workflow(&payload).await,
                        };
                        result.map_err(Arc::new)
                    },
                    move |result| Message::Saved(request, result),
                );
            }
            Message::Saved(request, result) => {
                self.builder.finish_save(&request, result.map_err(unshare))
            }
            Message::OpenIdChanged(id) => self.open_id = id,
            Message::Open => {
                let id = self.open_id.trim().to_string();
                if id.is_empty() {
                    return Command::none();
                }
                let service = Arc::clone(&self.service);
                return Command::perform(
                    async move { service.get_workflow(&id).await.map_err(Arc::new) },
                    Message::Opened,
                );
            }
            Message::Opened(Ok(workflow)) => {
                self.toast(NoticeLevel::Info, format!("Opened {}", workflow.name));
                self.builder.open(workflow);
            }
            Message::Opened(Err(err)) => {
                self.toast(NoticeLevel::Error, format!("Open failed: {err}"));
            }
            Message::AgentsLoaded(agents) => self.builder.set_agents(agents),
            Message::FilePathChanged(path) => self.file_path = path,
            Message::Import => self.import_file(),
            Message::Export => self.export_file(),
            Message::DismissToasts => self.toasts.clear(),
        }
        Command::none()
    }

    fn import_file(&mut self) {
        let loaded = fs::read_to_string(&self.file_path)
            .map_err(|err| format!("Read error: {err}"))
            .and_then(|content| {
                WorkflowDefinition::from_yaml_str(&content)
                    .map_err(|err| format!("Parse error: {err}"))
            });
        match loaded {
            Ok(definition) => {
                self.builder.import_definition(definition);
                self.toast(NoticeLevel::Info, "Imported workflow definition");
            }
            Err(message) => self.toast(NoticeLevel::Error, message),
        }
    }

    fn export_file(&mut self) {
        let written = self
            .builder
            .definition()
            .to_yaml_string()
            .map_err(|err| format!("Serialize error: {err}"))
            .and_then(|yaml| {
                fs::write(&self.file_path, yaml).map_err(|err| format!("Write error: {err}"))
            });
        match written {
            Ok(()) => self.toast(NoticeLevel::Success, "Exported workflow definition"),
            Err(message) => self.toast(NoticeLevel::Error, message),
        }
    }

    fn toast(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.toasts.push(Notice {
            level,
            message: message.into(),
        });
    }

    /// Reloads the bindings editor when the panel switches steps.
    fn sync_bindings_editor(&mut self) {
        let panel = self.builder.panel();
        if panel.step_id() != self.bindings_step.as_deref() {
            self.bindings_step = panel.step_id().map(str::to_string);
            self.bindings = text_editor::Content::with_text(panel.bindings().text());
        }
    }

    fn workflow_controls(&self) -> Element<'_, Message> {
        let mut name = column![
            text("Workflow").size(20),
            text_input("name", self.builder.name()).on_input(Message::NameChanged),
        ]
        .spacing(6);
        if let Some(error) = self.builder.name_error() {
            name = name.push(text(error).size(13).style(Color::from_rgb(0.9, 0.35, 0.35)));
        }

        let validate = button(if self.builder.is_validating() {
            "Validating..."
        } else {
            "Validate"
        })
        .on_press_maybe((!self.builder.is_validating()).then_some(Message::Validate));
        let save = button(if self.builder.is_saving() { "Saving..." } else { "Save" })
            .on_press_maybe((!self.builder.is_saving()).then_some(Message::Save));

        column![
            name,
            text_input("description", self.builder.description())
                .on_input(Message::DescriptionChanged),
            row![validate, save].spacing(8),
            row![
                text_input("workflow id", &self.open_id).on_input(Message::OpenIdChanged),
                button("Open").on_press(Message::Open)
            ]
            .spacing(6),
            text_input("file path", &self.file_path).on_input(Message::FilePathChanged),
            row![
                button("Import YAML").on_press(Message::Import),
                button("Export YAML").on_press(Message::Export)
            ]
            .spacing(8),
        ]
        .spacing(8)
        .into()
    }

    fn palette(&self) -> Element<'_, Message> {
        let entries = StepType::ALL.into_iter().fold(
            column![text("Add step").size(20)].spacing(6),
            |col, step_type| {
                let place_label = if self.armed == Some(step_type) {
                    "Placing..."
                } else {
                    "Place"
                };
                col.push(
                    row![
                        button(step_type.default_name())
                            .on_press(Message::AddStep(step_type))
                            .width(Length::Fill),
                        button(place_label).on_press(Message::ArmDrop(step_type))
                    ]
                    .spacing(6),
                )
            },
        );

        let zoom = row![
            button("-").on_press(Message::Wheel(1.0)),
            text(format!("{:.0}%", self.builder.view().zoom * 100.0)),
            button("+").on_press(Message::Wheel(-1.0)),
        ]
        .spacing(8)
        .align_items(alignment::Alignment::Center);

        column![entries, zoom].spacing(12).into()
    }

    fn variables_view(&self) -> Element<'_, Message> {
        let list = self.builder.definition().variables.iter().enumerate().fold(
            column![text("Variables").size(20)].spacing(6),
            |col, (index, variable)| {
                col.push(
                    row![
                        text(&variable.name).width(Length::Fill),
                        button("X").on_press(Message::RemoveVariable(index))
                    ]
                    .spacing(6),
                )
            },
        );
        list.push(
            row![
                text_input("new variable", &self.new_variable)
                    .on_input(Message::NewVariableChanged)
                    .on_submit(Message::AddVariable),
                button("Add").on_press(Message::AddVariable)
            ]
            .spacing(6),
        )
        .into()
    }

    fn inspector_view<'a>(&'a self, overlay: &IssueOverlay<'_>) -> Element<'a, Message> {
        let Some(step) = self.builder.selected_step() else {
            return container(
                text("Select a step to configure it")
                    .horizontal_alignment(alignment::Horizontal::Center),
            )
            .padding(16)
            .into();
        };
        let fields = step.step_type.fields();
        let definition = self.builder.definition();

        let mut view = column![
            text(format!("Editing {}", step.id)).size(20),
            text(step.step_type.default_name()).size(13),
            text_input("name", &step.name).on_input(|v| Message::Edit(PanelEdit::Name(v))),
        ]
        .spacing(8);

        if fields.timeout {
            let value = step.timeout_seconds.map(|t| t.to_string()).unwrap_or_default();
            view = view.push(
                text_input("timeout (seconds)", &value).on_input(Message::TimeoutInput),
            );
        }
        if fields.retries {
            let value = step.retries.map(|r| r.to_string()).unwrap_or_default();
            view = view.push(text_input("retries", &value).on_input(Message::RetriesInput));
        }

        if fields.agent {
            let agent: Element<Message> = match self.builder.agent_selector() {
                AgentSelector::Choices(choices) => {
                    let selected = choices
                        .iter()
                        .find(|choice| step.agent_id.as_deref() == Some(choice.id.as_str()))
                        .cloned();
                    row![
                        pick_list(choices, selected, |choice: Choice| {
                            Message::Edit(PanelEdit::Agent(Some(choice.id)))
                        })
                        .placeholder("agent")
                        .width(Length::Fill),
                        button("Clear").on_press(Message::Edit(PanelEdit::Agent(None)))
                    ]
                    .spacing(6)
                    .into()
                }
                AgentSelector::FreeText => {
                    text_input("agent id", step.agent_id.as_deref().unwrap_or(""))
                        .on_input(|v| Message::Edit(PanelEdit::Agent(Some(v))))
                        .into()
                }
            };
            view = view.push(agent);
        }

        if fields.fallback {
            let candidates = fallback_candidates(definition, &step.id);
            let selected = candidates
                .iter()
                .find(|choice| step.fallback_step_id.as_deref() == Some(choice.id.as_str()))
                .cloned();
            view = view.push(
                row![
                    pick_list(candidates, selected, |choice: Choice| {
                        Message::Edit(PanelEdit::Fallback(Some(choice.id)))
                    })
                    .placeholder("fallback step")
                    .width(Length::Fill),
                    button("None").on_press(Message::Edit(PanelEdit::Fallback(None)))
                ]
                .spacing(6),
            );
        }

        let draft = self.builder.panel().bindings();
        view = view.push(text("Bindings (JSON object)").size(16)).push(
            text_editor(&self.bindings)
                .on_action(Message::BindingsAction)
                .height(Length::Fixed(140.0)),
        );
        if let Some(error) = draft.error() {
            view = view.push(text(error).size(13).style(Color::from_rgb(0.9, 0.35, 0.35)));
        }

        let outgoing = definition.outgoing(&step.id).fold(
            column![text("Dependents").size(16)].spacing(4),
            |col, edge| {
                col.push(
                    row![
                        text(format!("-> {}", edge.to_step_id)).width(Length::Fill),
                        button("X").on_press(Message::DeleteEdge(edge.id.clone()))
                    ]
                    .spacing(6),
                )
            },
        );
        view = view.push(outgoing);

        if !overlay.selected.is_empty() {
            view = view.push(issue_list("Step issues", &overlay.selected));
        }

        let link_button = if self.builder.linking_from() == Some(step.id.as_str()) {
            button("Cancel linking").on_press(Message::CancelLinking)
        } else {
            button("Link from this step").on_press(Message::StartLinking)
        };
        view.push(
            row![
                link_button,
                horizontal_space(),
                button("Delete step").on_press(Message::DeleteSelected)
            ]
            .spacing(8),
        )
        .into()
    }

    fn workflow_issues_view<'a>(&'a self, overlay: &IssueOverlay<'_>) -> Element<'a, Message> {
        match self.builder.validation() {
            None => column![].into(),
            Some(result) if overlay.workflow.is_empty() => text(format!(
                "{} ({} error(s), {} warning(s))",
                if result.valid { "Valid" } else { "Invalid" },
                result.error_count(),
                result.warning_count()
            ))
            .size(14)
            .into(),
            Some(_) => issue_list("Workflow issues", &overlay.workflow),
        }
    }

    fn status_bar(&self) -> Element<'_, Message> {
        let mode = match self.builder.interaction().mode() {
            InteractionMode::Idle => match self.armed {
                Some(step_type) => format!("Click the canvas to place a {}", step_type.default_name()),
                None => "Ready".to_string(),
            },
            InteractionMode::Panning { .. } => "Panning".to_string(),
            InteractionMode::DraggingStep { step_id, .. } => format!("Moving {step_id}"),
            InteractionMode::LinkingFrom(step_id) => {
                format!("Linking from {step_id}: click a target step, Esc cancels")
            }
        };

        let toasts = self
            .toasts
            .iter()
            .fold(row![].spacing(12), |row, notice| {
                row.push(text(&notice.message).size(14).style(notice_color(notice.level)))
            });

        let mut bar = row![text(mode).size(14), horizontal_space(), toasts].spacing(12);
        if !self.toasts.is_empty() {
            bar = bar.push(button("Dismiss").on_press(Message::DismissToasts));
        }
        bar.align_items(alignment::Alignment::Center).into()
    }
}

fn issue_list<'a>(title: &str, issues: &[&werkbank::ValidationIssue]) -> Element<'a, Message> {
    issues
        .iter()
        .fold(
            Column::new().push(text(title.to_string()).size(16)).spacing(4),
            |col, issue| {
                let color = match issue.severity {
                    Severity::Error => Color::from_rgb(0.9, 0.35, 0.35),
                    Severity::Warning => Color::from_rgb(0.95, 0.7, 0.25),
                };
                col.push(text(format!("{}: {}", issue.severity, issue.message)).size(13).style(color))
            },
        )
        .into()
}

fn notice_color(level: NoticeLevel) -> Color {
    match level {
        NoticeLevel::Info => Color::from_rgb(0.7, 0.75, 0.85),
        NoticeLevel::Success => Color::from_rgb(0.4, 0.8, 0.45),
        NoticeLevel::Error => Color::from_rgb(0.9, 0.35, 0.35),
    }
}

fn shortcut(key: keyboard::Key, _modifiers: keyboard::Modifiers) -> Option<Message> {
    match key {
        keyboard::Key::Named(keyboard::key::Named::Escape) => Some(Message::CancelLinking),
        keyboard::Key::Named(keyboard::key::Named::Delete) => Some(Message::DeleteSelected),
        _ => None,
    }
}

fn window_pointer(event: iced::Event, _status: event::Status) -> Option<Message> {
    match event {
        iced::Event::Mouse(mouse::Event::CursorMoved { position }) => {
            Some(Message::PointerMoved(position))
        }
        iced::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
            Some(Message::PointerReleased)
        }
        _ => None,
    }
}

/// Takes the error back out of the shared handle the message carried.
fn unshare(err: Arc<ServiceError>) -> ServiceError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| ServiceError::Api {
        status: 0,
        message: shared.to_string(),
    })
}

fn to_model(point: iced::Point) -> geo::Point {
    geo::Point::new(point.x, point.y)
}

fn to_iced(point: geo::Point) -> iced::Point {
    iced::Point::new(point.x, point.y)
}

struct GraphView<'a> {
    builder: &'a WorkflowBuilder,
    armed: Option<StepType>,
}

impl<'a> GraphView<'a> {
    fn view(&self) -> &CanvasView {
        self.builder.view()
    }

    fn draw_grid(&self, frame: &mut canvas::Frame, bounds: Rectangle) {
        let view = self.view();
        let spacing = GRID * view.zoom;
        let stroke = canvas::Stroke {
            style: canvas::Style::Solid(Color::from_rgba(0.6, 0.6, 0.6, 0.15)),
            width: 1.0,
            ..Default::default()
        };

        let mut x = view.x.rem_euclid(spacing);
        while x < bounds.width {
            frame.stroke(
                &canvas::Path::line(iced::Point::new(x, 0.0), iced::Point::new(x, bounds.height)),
                stroke.clone(),
            );
            x += spacing;
        }
        let mut y = view.y.rem_euclid(spacing);
        while y < bounds.height {
            frame.stroke(
                &canvas::Path::line(iced::Point::new(0.0, y), iced::Point::new(bounds.width, y)),
                stroke.clone(),
            );
            y += spacing;
        }
    }

    /// Edges and nodes, in canvas units. The caller applies pan and zoom.
    fn draw_graph(&self, frame: &mut canvas::Frame, cursor: Option<geo::Point>) {
        let definition = self.builder.definition();
        let overlay = self.builder.overlay();

        for edge in &definition.edges {
            let (Some(from), Some(to)) = (
                definition.step(&edge.from_step_id),
                definition.step(&edge.to_step_id),
            ) else {
                continue;
            };
            let start = from.position.offset(NODE_WIDTH, NODE_HEIGHT / 2.0);
            let end = to.position.offset(0.0, NODE_HEIGHT / 2.0);
            frame.stroke(
                &connector(start, end),
                canvas::Stroke {
                    style: canvas::Style::Solid(Color::from_rgb(0.75, 0.75, 0.8)),
                    width: 2.0,
                    ..Default::default()
                },
            );
            frame.fill(
                &canvas::Path::circle(to_iced(end), 4.0),
                Color::from_rgb(0.75, 0.75, 0.8),
            );
        }

        if let (Some(source), Some(cursor)) = (self.builder.linking_from(), cursor) {
            if let Some(step) = definition.step(source) {
                frame.stroke(
                    &canvas::Path::line(to_iced(geo::step_center(step)), to_iced(cursor)),
                    canvas::Stroke {
                        style: canvas::Style::Solid(Color::from_rgb(0.35, 0.65, 0.95)),
                        width: 2.0,
                        ..Default::default()
                    },
                );
            }
        }

        let selected = self.builder.interaction().selected();
        for step in &definition.steps {
            let position = to_iced(step.position);
            let size = Size::new(NODE_WIDTH, NODE_HEIGHT);
            let fill = if selected == Some(step.id.as_str()) {
                Color::from_rgb(0.18, 0.35, 0.62)
            } else {
                Color::from_rgb(0.23, 0.23, 0.26)
            };
            let border = if self.builder.linking_from() == Some(step.id.as_str()) {
                Color::from_rgb(0.35, 0.65, 0.95)
            } else {
                Color::WHITE
            };

            frame.fill_rectangle(position, size, fill);
            frame.stroke(
                &canvas::Path::rectangle(position, size),
                canvas::Stroke {
                    width: 2.0,
                    style: canvas::Style::Solid(border),
                    ..Default::default()
                },
            );
            frame.fill_text(canvas::Text {
                content: step.name.clone(),
                position: iced::Point::new(position.x + 10.0, position.y + 12.0),
                color: Color::WHITE,
                size: iced::Pixels(16.0),
                ..Default::default()
            });
            frame.fill_text(canvas::Text {
                content: step.step_type.default_name().to_string(),
                position: iced::Point::new(position.x + 10.0, position.y + 36.0),
                color: Color::from_rgba(1.0, 1.0, 1.0, 0.7),
                size: iced::Pixels(12.0),
                ..Default::default()
            });
            if let Some(agent) = &step.agent_id {
                frame.fill_text(canvas::Text {
                    content: format!("agent: {agent}"),
                    position: iced::Point::new(position.x + 10.0, position.y + 56.0),
                    color: Color::from_rgba(1.0, 1.0, 1.0, 0.7),
                    size: iced::Pixels(12.0),
                    ..Default::default()
                });
            }

            if let Some(count) = overlay.badge(&step.id) {
                let center = iced::Point::new(position.x + NODE_WIDTH - 4.0, position.y + 4.0);
                frame.fill(
                    &canvas::Path::circle(center, 11.0),
                    Color::from_rgb(0.85, 0.3, 0.3),
                );
                frame.fill_text(canvas::Text {
                    content: count.to_string(),
                    position: center,
                    color: Color::WHITE,
                    size: iced::Pixels(12.0),
                    horizontal_alignment: alignment::Horizontal::Center,
                    vertical_alignment: alignment::Vertical::Center,
                    ..Default::default()
                });
            }
        }
    }
}

fn connector(start: geo::Point, end: geo::Point) -> canvas::Path {
    let bend = ((end.x - start.x).abs() / 2.0).max(40.0);
    canvas::Path::new(|builder| {
        builder.move_to(to_iced(start));
        builder.bezier_curve_to(
            iced::Point::new(start.x + bend, start.y),
            iced::Point::new(end.x - bend, end.y),
            to_iced(end),
        );
    })
}

impl<'a> canvas::Program<Message> for GraphView<'a> {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        frame.fill_rectangle(
            iced::Point::ORIGIN,
            bounds.size(),
            Color::from_rgb(0.12, 0.12, 0.14),
        );
        self.draw_grid(&mut frame, bounds);

        let view = *self.view();
        let cursor = cursor
            .position_in(bounds)
            .map(|local| view.to_canvas(to_model(local)));
        frame.with_save(|frame| {
            frame.translate(Vector::new(view.x, view.y));
            frame.scale(view.zoom);
            self.draw_graph(frame, cursor);
        });

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        _state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> (event::Status, Option<Message>) {
        let Some(local) = cursor.position_in(bounds) else {
            return (event::Status::Ignored, None);
        };
        match event {
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => (
                event::Status::Captured,
                Some(Message::CanvasPressed {
                    local,
                    origin: Vector::new(bounds.x, bounds.y),
                }),
            ),
            canvas::Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                let y = match delta {
                    mouse::ScrollDelta::Lines { y, .. } | mouse::ScrollDelta::Pixels { y, .. } => y,
                };
                // iced reports scrolling up as positive; the model zooms in on negative deltas.
                (event::Status::Captured, Some(Message::Wheel(-y)))
            }
            _ => (event::Status::Ignored, None),
        }
    }

    fn mouse_interaction(
        &self,
        _state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        match self.builder.interaction().mode() {
            InteractionMode::Panning { .. } | InteractionMode::DraggingStep { .. } => {
                return mouse::Interaction::Grabbing
            }
            InteractionMode::LinkingFrom(_) => return mouse::Interaction::Crosshair,
            InteractionMode::Idle => {}
        }
        if self.armed.is_some() {
            return mouse::Interaction::Crosshair;
        }
        if let Some(local) = cursor.position_in(bounds) {
            let point = self.view().to_canvas(to_model(local));
            if geo::step_at(self.builder.definition(), point).is_some() {
                return mouse::Interaction::Grab;
            }
        }
        mouse::Interaction::default()
    }
}
