pub mod cancel;
pub mod coordinator;
pub mod run;
pub mod stages;

pub use cancel::CancelToken;
pub use coordinator::PipelineCoordinator;
pub use run::{Artifacts, PipelineErrorView, PipelineRun, RunState, Stage, StageState, StageStatus};
pub use stages::{AdvisoryStage, AnalysisStage, RunContext, SourceStage};
