//! Collaborators shared by the setup and save phases

use crate::state::StateFile;
use crate::store::ArchiveStore;
use crate::tool::CommandRunner;
use crate::workflow::WorkflowEnv;

/// External collaborators for one phase invocation
///
/// Borrowed trait objects so the CLI can pass real implementations and tests
/// can pass `MockRunner` / `MockStore`.
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub store: &'a dyn ArchiveStore,
    pub workflow: &'a WorkflowEnv,
    pub state_file: &'a StateFile,
}

impl std::fmt::Debug for JobContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("workflow", self.workflow)
            .field("state_file", &self.state_file.path())
            .finish_non_exhaustive()
    }
}
