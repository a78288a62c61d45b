//! Command descriptors, outcomes and cancellation handles.

use crate::error::{Error, Result};
use crate::package::{DependencyType, Package};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// The kind of package manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Install,
    Uninstall,
    Search,
    Update,
}

impl CommandKind {
    /// Whether the command changes the project and should be followed by a refresh.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, CommandKind::Search)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Install => write!(f, "install"),
            CommandKind::Uninstall => write!(f, "uninstall"),
            CommandKind::Search => write!(f, "search"),
            CommandKind::Update => write!(f, "update"),
        }
    }
}

/// Where and how the external tool is invoked. Shared by every descriptor
/// built from the same project model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    /// Directory the tool runs in (the root package directory).
    pub working_dir: PathBuf,
    /// Configured path to the executable, if any.
    pub tool_path: Option<PathBuf>,
    /// Look the executable up elsewhere when `tool_path` is missing.
    pub use_fallback: bool,
}

/// An immutable description of one package manager invocation.
///
/// Only the constructors below build one, so a descriptor always carries the
/// fields its kind needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    kind: CommandKind,
    package: Option<String>,
    version_range: Option<String>,
    dependency_type: DependencyType,
    global: bool,
    packages: Vec<String>,
    search_text: Option<String>,
    context: ToolContext,
}

impl CommandDescriptor {
    fn base(kind: CommandKind, context: ToolContext) -> Self {
        Self {
            kind,
            package: None,
            version_range: None,
            dependency_type: DependencyType::Standard,
            global: false,
            packages: Vec::new(),
            search_text: None,
            context,
        }
    }

    /// Describes `install <name>[@<range>]`.
    pub fn install(
        name: &str,
        version_range: Option<&str>,
        dependency_type: DependencyType,
        global: bool,
        context: ToolContext,
    ) -> Result<Self> {
        let name = validate_package_name(name)?;
        Ok(Self {
            package: Some(name),
            version_range: version_range
                .map(str::trim)
                .filter(|range| !range.is_empty())
                .map(str::to_string),
            dependency_type,
            global,
            ..Self::base(CommandKind::Install, context)
        })
    }

    /// Describes `uninstall <name>`.
    pub fn uninstall(
        name: &str,
        dependency_type: DependencyType,
        global: bool,
        context: ToolContext,
    ) -> Result<Self> {
        let name = validate_package_name(name)?;
        Ok(Self {
            package: Some(name),
            dependency_type,
            global,
            ..Self::base(CommandKind::Uninstall, context)
        })
    }

    /// Describes a registry search. npm refuses to search without terms, so
    /// a blank query is rejected here.
    pub fn search(search_text: &str, context: ToolContext) -> Result<Self> {
        let search_text = search_text.trim();
        if search_text.is_empty() {
            return Err(Error::InvalidArgument("search text is empty".into()));
        }
        Ok(Self {
            search_text: Some(search_text.to_string()),
            ..Self::base(CommandKind::Search, context)
        })
    }

    /// Describes `update` over the given packages, or all of them when empty.
    pub fn update(packages: &[Package], context: ToolContext) -> Result<Self> {
        let packages = packages
            .iter()
            .map(|pkg| validate_package_name(&pkg.name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            packages,
            ..Self::base(CommandKind::Update, context)
        })
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Target package for install/uninstall.
    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn version_range(&self) -> Option<&str> {
        self.version_range.as_deref()
    }

    pub fn dependency_type(&self) -> DependencyType {
        self.dependency_type
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Package subset for update. Empty means everything.
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Query text for search.
    pub fn search_text(&self) -> Option<&str> {
        self.search_text.as_deref()
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }
}

fn validate_package_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument("package name is empty".into()));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidArgument(format!(
            "package name contains whitespace: {:?}",
            name
        )));
    }
    Ok(name.to_string())
}

/// What the execution primitive reports once a command has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Parsed results, only filled in for search.
    pub results: Vec<Package>,
    pub duration_ms: u64,
    /// The command was stopped through its [`CommandHandle`].
    pub cancelled: bool,
    /// The command was killed after running past its time limit.
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn success(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn failure(
        exit_code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn with_results(mut self, results: Vec<Package>) -> Self {
        self.results = results;
        self
    }
}

/// Cooperative cancellation token for one running command.
///
/// Clones share state: cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    state: Arc<watch::Sender<bool>>,
}

impl CommandHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { state: Arc::new(tx) }
    }

    /// Requests cancellation. Calling it more than once has no further effect.
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Whether two handles refer to the same command.
    pub fn same_command(&self, other: &CommandHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for CommandHandle {
    fn default() -> Self {
        Self::new()
    }
}
