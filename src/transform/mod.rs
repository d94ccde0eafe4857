pub mod orchestrator;
pub mod platform;

pub use orchestrator::{
    DocumentState, DocumentStatus, InitReport, TransformOrchestrator, TransformOutcome,
    TransformPlan,
};
pub use platform::PlatformTarget;
