//! The project model that owns a commander.

use crate::command::ToolContext;
use crate::error::Error;
use crate::package::RootPackage;
use std::path::PathBuf;

/// The project a [`Commander`](crate::Commander) operates on.
///
/// The commander reads tool settings and the root package from it, forwards
/// log events into its sinks and calls [`refresh`](Self::refresh) after every
/// command that changes the project. All methods are called synchronously
/// from the commander's task and should return promptly.
pub trait PackageModel: Send + Sync {
    /// Directory holding the root package manifest.
    fn working_directory(&self) -> PathBuf;

    /// Configured path to the package manager executable.
    fn tool_path(&self) -> Option<PathBuf>;

    /// Whether to search for the executable when `tool_path` is unusable.
    fn use_fallback(&self) -> bool;

    /// The current root package, if one has been loaded.
    fn root_package(&self) -> Option<RootPackage>;

    /// Reloads project state after a mutating command.
    fn refresh(&self);

    fn log_output(&self, text: &str);

    fn log_error(&self, text: &str);

    fn log_exception(&self, error: &Error);

    /// Tool settings snapshot used to build command descriptors.
    fn tool_context(&self) -> ToolContext {
        ToolContext {
            working_dir: self.working_directory(),
            tool_path: self.tool_path(),
            use_fallback: self.use_fallback(),
        }
    }
}
