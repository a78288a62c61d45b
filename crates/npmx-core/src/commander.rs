//! Command orchestrator.
//!
//! The [`Commander`] turns one package operation at a time into a
//! [`CommandDescriptor`], hands it to a [`CommandRunner`], relays the captured
//! output through its [`LogChannel`] and asks the owning [`PackageModel`] to
//! refresh. No public operation returns an error: failures are published as
//! exception events and reported as `false` or an empty list.
//!
//! Only the most recently started command is tracked for cancellation.
//! Starting a second operation before the first completes replaces the
//! tracked handle, so [`Commander::cancel_current_command`] then targets the
//! newer command. Callers are expected to serialise operations.

use crate::command::{CommandDescriptor, CommandHandle, CommandKind, CommandOutcome};
use crate::error::Result;
use crate::events::{LogChannel, SubscriptionId};
use crate::model::PackageModel;
use crate::package::{DependencyType, Package};
use crate::runner::CommandRunner;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Outcome of a commander operation with the failure reason kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult<T> {
    pub success: bool,
    pub value: T,
    /// Human-readable reason when `success` is false.
    pub error: Option<String>,
}

impl<T> OperationResult<T> {
    fn ok(value: T) -> Self {
        Self {
            success: true,
            value,
            error: None,
        }
    }

    fn failed(value: T, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            value,
            error: Some(reason.into()),
        }
    }
}

/// Runs package manager commands on behalf of a project model.
pub struct Commander {
    model: Arc<dyn PackageModel>,
    runner: Arc<dyn CommandRunner>,
    events: Arc<LogChannel>,
    current: Mutex<Option<CommandHandle>>,
    // `None` once disposed.
    model_subscriptions: Mutex<Option<Vec<SubscriptionId>>>,
}

impl Commander {
    /// Creates a commander and subscribes the model's log sinks to its events.
    pub fn new(model: Arc<dyn PackageModel>, runner: Arc<dyn CommandRunner>) -> Self {
        let events = Arc::new(LogChannel::new());

        let out = Arc::clone(&model);
        let err = Arc::clone(&model);
        let exc = Arc::clone(&model);
        let subscriptions = vec![
            events.subscribe_output(move |e| out.log_output(&e.text)),
            events.subscribe_error(move |e| err.log_error(&e.text)),
            events.subscribe_exception(move |e| exc.log_exception(e)),
        ];

        Self {
            model,
            runner,
            events,
            current: Mutex::new(None),
            model_subscriptions: Mutex::new(Some(subscriptions)),
        }
    }

    /// The event channel, for subscribers beyond the owning model.
    pub fn events(&self) -> &Arc<LogChannel> {
        &self.events
    }

    pub async fn install_package(
        &self,
        name: &str,
        version_range: &str,
        dependency_type: DependencyType,
    ) -> bool {
        self.install_package_detailed(name, version_range, dependency_type, false)
            .await
            .success
    }

    pub async fn install_global_package(&self, name: &str, version_range: &str) -> bool {
        self.install_package_detailed(name, version_range, DependencyType::Standard, true)
            .await
            .success
    }

    pub async fn install_package_detailed(
        &self,
        name: &str,
        version_range: &str,
        dependency_type: DependencyType,
        global: bool,
    ) -> OperationResult<()> {
        let outcome = self
            .run(|model| {
                CommandDescriptor::install(
                    name,
                    Some(version_range),
                    dependency_type,
                    global,
                    model.tool_context(),
                )
            })
            .await;
        self.settle(CommandKind::Install, outcome, |_| ())
    }

    pub async fn uninstall_package(&self, name: &str) -> bool {
        self.uninstall_package_detailed(name, false).await.success
    }

    pub async fn uninstall_global_package(&self, name: &str) -> bool {
        self.uninstall_package_detailed(name, true).await.success
    }

    pub async fn uninstall_package_detailed(
        &self,
        name: &str,
        global: bool,
    ) -> OperationResult<()> {
        let outcome = self
            .run(|model| {
                let dependency_type = self.dependency_type_of(name);
                CommandDescriptor::uninstall(name, dependency_type, global, model.tool_context())
            })
            .await;
        self.settle(CommandKind::Uninstall, outcome, |_| ())
    }

    /// Searches the registry. Returns an empty list on any failure.
    pub async fn search(&self, search_text: &str) -> Vec<Package> {
        self.search_detailed(search_text).await.value
    }

    pub async fn search_detailed(&self, search_text: &str) -> OperationResult<Vec<Package>> {
        let outcome = self
            .run(|model| CommandDescriptor::search(search_text, model.tool_context()))
            .await;
        self.settle(CommandKind::Search, outcome, |outcome| outcome.results)
    }

    /// Updates the given packages, or everything when `packages` is empty.
    pub async fn update_packages(&self, packages: &[Package]) -> bool {
        self.update_packages_detailed(packages).await.success
    }

    pub async fn update_all_packages(&self) -> bool {
        self.update_packages(&[]).await
    }

    pub async fn update_packages_detailed(&self, packages: &[Package]) -> OperationResult<()> {
        let outcome = self
            .run(|model| CommandDescriptor::update(packages, model.tool_context()))
            .await;
        self.settle(CommandKind::Update, outcome, |_| ())
    }

    /// Requests cancellation of the most recently started command.
    ///
    /// Does nothing if no command is in flight. The pending operation still
    /// has to be awaited; it completes with a failure result.
    pub fn cancel_current_command(&self) {
        if let Some(handle) = self.current().as_ref() {
            info!("Cancelling current command");
            handle.cancel();
        }
    }

    pub fn has_command_in_flight(&self) -> bool {
        self.current().is_some()
    }

    /// Detaches the owning model from the event channel. Safe to call twice.
    pub fn dispose(&self) {
        let subscriptions = self
            .model_subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ids) = subscriptions {
            for id in ids {
                self.events.unsubscribe(id);
            }
            debug!("Commander disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.model_subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn current(&self) -> MutexGuard<'_, Option<CommandHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dependency_type_of(&self, name: &str) -> DependencyType {
        self.model
            .root_package()
            .map(|root| root.dependency_type_of(name.trim()))
            .unwrap_or_default()
    }

    /// Builds, executes and post-processes one command.
    async fn run<F>(&self, build: F) -> Result<CommandOutcome>
    where
        F: FnOnce(&dyn PackageModel) -> Result<CommandDescriptor>,
    {
        let descriptor = build(self.model.as_ref())?;
        let handle = CommandHandle::new();
        *self.current() = Some(handle.clone());

        info!(
            kind = %descriptor.kind(),
            package = ?descriptor.package(),
            "Running package command"
        );
        let result = self.runner.execute(&descriptor, handle.clone()).await;

        {
            let mut current = self.current();
            if current.as_ref().is_some_and(|h| h.same_command(&handle)) {
                *current = None;
            }
        }

        let outcome = result?;
        self.fire_log_events(descriptor.kind(), &outcome);
        if descriptor.kind().is_mutating() {
            self.model.refresh();
        }
        Ok(outcome)
    }

    fn fire_log_events(&self, kind: CommandKind, outcome: &CommandOutcome) {
        // Search lists the whole catalogue; that output is not worth logging.
        if kind == CommandKind::Search {
            return;
        }
        self.events.publish_output(&outcome.stdout);
        self.events.publish_error(&outcome.stderr);
    }

    /// Converts a command result into an operation result, publishing errors.
    fn settle<T: Default>(
        &self,
        kind: CommandKind,
        result: Result<CommandOutcome>,
        value: impl FnOnce(CommandOutcome) -> T,
    ) -> OperationResult<T> {
        match result {
            Ok(outcome) if outcome.success => {
                info!(%kind, duration_ms = outcome.duration_ms, "Package command succeeded");
                OperationResult::ok(value(outcome))
            }
            Ok(outcome) if outcome.cancelled => {
                warn!(%kind, "Package command cancelled");
                OperationResult::failed(T::default(), format!("{} was cancelled", kind))
            }
            Ok(outcome) if outcome.timed_out => {
                warn!(%kind, duration_ms = outcome.duration_ms, "Package command timed out");
                OperationResult::failed(T::default(), format!("{} timed out", kind))
            }
            Ok(outcome) => {
                let reason = match outcome.exit_code {
                    Some(code) => format!("{} exited with code {}", kind, code),
                    None => format!("{} terminated without an exit code", kind),
                };
                warn!(%kind, "{}", reason);
                OperationResult::failed(T::default(), reason)
            }
            Err(e) => {
                error!(%kind, "Package command failed: {}", e);
                self.events.publish_exception(&e);
                OperationResult::failed(T::default(), e.to_string())
            }
        }
    }
}

impl Drop for Commander {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Commander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commander")
            .field("events", &self.events)
            .field("in_flight", &self.has_command_in_flight())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
