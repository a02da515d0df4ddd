#![forbid(unsafe_code)]

//! Services handed to every widget constructor.

use std::rc::Rc;

use statebar_runtime::{Runtime, SharedRunner, ShellRunner};

use crate::config::BarConfig;

/// Explicit application context: the runtime that owns the UI side of
/// pollers and tasks, the command runner, and the configuration.
///
/// Cheap to clone; every clone refers to the same services.
#[derive(Clone)]
pub struct BarContext {
    runtime: Rc<Runtime>,
    runner: SharedRunner,
    config: Rc<BarConfig>,
}

impl BarContext {
    #[must_use]
    pub fn new(runtime: Rc<Runtime>, runner: SharedRunner, config: BarConfig) -> Self {
        Self {
            runtime,
            runner,
            config: Rc::new(config),
        }
    }

    /// A context using `sh -c` for commands.
    #[must_use]
    pub fn with_shell(config: BarConfig) -> Self {
        Self::new(Rc::new(Runtime::new()), ShellRunner::shared(), config)
    }

    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    #[must_use]
    pub fn runner(&self) -> &SharedRunner {
        &self.runner
    }

    #[must_use]
    pub fn config(&self) -> &BarConfig {
        &self.config
    }
}

impl std::fmt::Debug for BarContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarContext")
            .field("runtime", &self.runtime)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
