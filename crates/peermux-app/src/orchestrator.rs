//! Background task lifecycle.

use tokio::task::JoinHandle;
use tracing::info;

/// Owns every long-lived background task so shutdown can reap them.
#[derive(Default)]
pub struct Orchestrator {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Orchestrator {
    /// Construct an empty orchestrator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a named background task.
    pub fn track(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.push((name, handle));
    }

    /// Abort every tracked task; called once on shutdown.
    pub fn shutdown(self) {
        for (name, handle) in self.tasks {
            handle.abort();
            info!(task = name, "background task stopped");
        }
    }
}
