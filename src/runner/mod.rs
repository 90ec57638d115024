//! Stage runners.
//!
//! The orchestrator never implements a stage itself: each one is handed to a
//! [`StageRunner`]. [`ExternalStageRunner`] runs one external command per
//! stage inside the repository's working directory.

mod external;

pub use external::ExternalStageRunner;

use async_trait::async_trait;

use crate::error::Result;
use crate::project::Project;
use crate::task::Stage;

/// Executes a single pipeline stage for a project.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Runs `stage` against the project's working directory.
    ///
    /// Returns [`crate::Error::Stage`] when the stage reports failure.
    async fn run(&self, stage: Stage, project: &Project<'_>) -> Result<()>;

    /// Returns the name of this runner.
    fn name(&self) -> &str;
}
