pub mod definition;
pub mod store;

pub use definition::{
    DefinitionError, Edge, EdgeKind, Step, StepFields, StepType, Variable, WorkflowDefinition,
    SCHEMA_VERSION,
};
pub use store::{GraphStore, StepPatch};
