pub mod catalogue;
pub mod domain;
pub mod machine;

pub use catalogue::WorkflowCatalogue;
pub use domain::{
    NavigationError, ParseNameError, Role, Stage, StageConfig, StageProgress, StepState,
    SubStageConfig, SubStageProgress, Transition, WorkflowPosition, WorkflowProgress,
};
pub use machine::WorkflowStateMachine;
