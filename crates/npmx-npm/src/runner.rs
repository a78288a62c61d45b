//! Running npm as a child process.

use crate::args::build_arguments;
use crate::config::NpmConfig;
use crate::resolve::resolve_npm_path;
use crate::search::parse_search_output;
use async_trait::async_trait;
use npmx_core::error::{Error, Result};
use npmx_core::{CommandDescriptor, CommandHandle, CommandKind, CommandOutcome, CommandRunner};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to keep draining pipes after npm was killed. A grandchild that
/// inherited the pipes can hold them open long after npm itself is gone.
const KILL_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Executes command descriptors with the npm executable.
#[derive(Debug, Clone, Default)]
pub struct NpmRunner {
    config: NpmConfig,
}

impl NpmRunner {
    pub fn new(config: NpmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NpmConfig {
        &self.config
    }

    fn build_command(&self, descriptor: &CommandDescriptor) -> Result<Command> {
        let context = descriptor.context();
        let configured = context
            .tool_path
            .as_deref()
            .or(self.config.npm_path.as_deref());
        let tool = resolve_npm_path(configured, context.use_fallback)?;
        let args = build_arguments(descriptor)?;

        debug!("Using npm: {} with args: {:?}", tool.display(), args);

        let mut cmd = Command::new(&tool);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if context.working_dir.is_dir() {
            cmd.current_dir(&context.working_dir);
        } else if !descriptor.is_global() {
            warn!(
                "Working directory does not exist or is not a directory: {}",
                context.working_dir.display()
            );
        }

        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        Ok(cmd)
    }
}

/// Why the wait on npm ended.
enum Stop {
    Exited(ExitStatus),
    Cancelled,
    TimedOut,
}

#[async_trait]
impl CommandRunner for NpmRunner {
    async fn execute(
        &self,
        descriptor: &CommandDescriptor,
        handle: CommandHandle,
    ) -> Result<CommandOutcome> {
        let start = Instant::now();
        let kind = descriptor.kind();
        let mut cmd = self.build_command(descriptor)?;

        if handle.is_cancelled() {
            info!("npm {} cancelled before start", kind);
            return Ok(cancelled_outcome(start));
        }

        let mut child = cmd.spawn().map_err(|e| Error::Spawn {
            tool: format!("{:?}", cmd.as_std().get_program()),
            message: e.to_string(),
        })?;
        debug!("Spawned npm {} with pid {:?}", kind, child.id());

        // Pipes are drained while npm runs so a kill still leaves its output.
        let stdout = Capture::spawn(child.stdout.take());
        let stderr = Capture::spawn(child.stderr.take());
        let timeout = self.config.timeout_secs.map(Duration::from_secs);

        let stop = tokio::select! {
            status = child.wait() => Stop::Exited(status?),
            _ = handle.cancelled() => Stop::Cancelled,
            _ = deadline(timeout) => Stop::TimedOut,
        };

        let grace = match stop {
            Stop::Exited(_) => None,
            Stop::Cancelled | Stop::TimedOut => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill npm {}: {}", kind, e);
                }
                Some(KILL_DRAIN_GRACE)
            }
        };
        let (stdout, stderr) = tokio::join!(stdout.collect(grace), stderr.collect(grace));

        debug!("Stdout length: {} bytes", stdout.len());
        debug!("Stderr length: {} bytes", stderr.len());

        let mut outcome = match stop {
            Stop::Exited(status) => {
                debug!("npm {} completed with exit code: {:?}", kind, status.code());
                if status.success() {
                    CommandOutcome::success(stdout, stderr)
                } else {
                    CommandOutcome::failure(status.code(), stdout, stderr)
                }
            }
            Stop::Cancelled => {
                info!("npm {} cancelled, process killed", kind);
                CommandOutcome {
                    cancelled: true,
                    ..CommandOutcome::failure(None, stdout, stderr)
                }
            }
            Stop::TimedOut => {
                warn!(
                    "npm {} timed out after {}s, process killed",
                    kind,
                    self.config.timeout_secs.unwrap_or_default()
                );
                CommandOutcome {
                    timed_out: true,
                    ..CommandOutcome::failure(None, stdout, stderr)
                }
            }
        };

        if outcome.success && kind == CommandKind::Search {
            outcome.results = parse_search_output(&outcome.stdout)?;
        }
        outcome.duration_ms = start.elapsed().as_millis() as u64;

        Ok(outcome)
    }
}

/// Bytes read so far from one of npm's output pipes.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let reader = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        debug!("Stopped reading npm output: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buffer, reader }
    }

    /// Waits for the pipe to close, or at most `grace` when one is given,
    /// and returns what was read.
    async fn collect(self, grace: Option<Duration>) -> String {
        let Self { buffer, mut reader } = self;
        match grace {
            None => {
                let _ = (&mut reader).await;
            }
            Some(grace) => {
                if tokio::time::timeout(grace, &mut reader).await.is_err() {
                    debug!("npm output pipe still open after kill");
                    reader.abort();
                }
            }
        }
        let bytes = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn cancelled_outcome(start: Instant) -> CommandOutcome {
    CommandOutcome {
        cancelled: true,
        duration_ms: start.elapsed().as_millis() as u64,
        ..CommandOutcome::failure(None, "", "")
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::controller::ProjectController;
    use npmx_core::{Commander, DependencyType, PackageModel, ToolContext};
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Writes a shell script standing in for npm.
    fn fake_npm(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("npm");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn context(dir: &Path, npm: &Path) -> ToolContext {
        ToolContext {
            working_dir: dir.to_path_buf(),
            tool_path: Some(npm.to_path_buf()),
            use_fallback: false,
        }
    }

    #[tokio::test]
    async fn test_install_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let npm = fake_npm(
            dir.path(),
            r#"echo "args: $*"; echo "npm WARN something" >&2"#,
        );
        let cmd = CommandDescriptor::install(
            "lodash",
            Some("^4.0.0"),
            DependencyType::Standard,
            false,
            context(dir.path(), &npm),
        )
        .unwrap();

        let outcome = NpmRunner::default()
            .execute(&cmd, CommandHandle::new())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "args: install lodash@^4.0.0 --save");
        assert_eq!(outcome.stderr.trim(), "npm WARN something");
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let npm = fake_npm(dir.path(), "pwd");
        let cmd = CommandDescriptor::update(&[], context(dir.path(), &npm)).unwrap();

        let outcome = NpmRunner::default()
            .execute(&cmd, CommandHandle::new())
            .await
            .unwrap();

        let expected = dir.path().canonicalize().unwrap();
        let reported = PathBuf::from(outcome.stdout.trim());
        assert_eq!(reported.canonicalize().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_failure_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let npm = fake_npm(dir.path(), r#"echo "npm ERR! 404" >&2; exit 1"#);
        let cmd = CommandDescriptor::uninstall(
            "nope",
            DependencyType::Standard,
            false,
            context(dir.path(), &npm),
        )
        .unwrap();

        let outcome = NpmRunner::default()
            .execute(&cmd, CommandHandle::new())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.stderr.contains("npm ERR! 404"));
    }

    #[tokio::test]
    async fn test_search_results_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let npm = fake_npm(
            dir.path(),
            r#"echo '[{"name":"react","version":"18.2.0","description":"UI"},{"name":"preact","version":"10.19.0"}]'"#,
        );
        let cmd = CommandDescriptor::search("react", context(dir.path(), &npm)).unwrap();

        let outcome = NpmRunner::default()
            .execute(&cmd, CommandHandle::new())
            .await
            .unwrap();

        assert!(outcome.success);
        let names: Vec<_> = outcome.results.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["react", "preact"]);
    }

    #[tokio::test]
    async fn test_cancel_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let npm = fake_npm(dir.path(), r#"echo "resolving"; sleep 30"#);
        let cmd = CommandDescriptor::update(&[], context(dir.path(), &npm)).unwrap();
        let handle = CommandHandle::new();

        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome = NpmRunner::default().execute(&cmd, handle).await.unwrap();

        assert!(outcome.cancelled);
        assert!(!outcome.success);
        assert_eq!(outcome.stdout.trim(), "resolving");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    const SLOW_INSTALL: &str = r#"echo "added 40 packages"; echo "npm WARN partial" >&2; sleep 30"#;

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let npm = fake_npm(dir.path(), SLOW_INSTALL);
        let cmd = CommandDescriptor::update(&[], context(dir.path(), &npm)).unwrap();
        let runner = NpmRunner::new(NpmConfig {
            timeout_secs: Some(1),
            ..NpmConfig::default()
        });

        let start = Instant::now();
        let outcome = runner.execute(&cmd, CommandHandle::new()).await.unwrap();

        assert!(outcome.timed_out);
        assert!(!outcome.success);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.stdout.trim(), "added 40 packages");
        assert_eq!(outcome.stderr.trim(), "npm WARN partial");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timed_out_install_relays_output_and_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let npm = fake_npm(dir.path(), SLOW_INSTALL);
        let config = NpmConfig {
            npm_path: Some(npm),
            use_fallback: false,
            timeout_secs: Some(1),
            ..NpmConfig::default()
        };
        let model = Arc::new(ProjectController::new(dir.path(), config.clone()));
        let commander = Commander::new(
            Arc::clone(&model) as Arc<dyn PackageModel>,
            Arc::new(NpmRunner::new(config)),
        );

        let logged = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&logged);
        commander
            .events()
            .subscribe_output(move |e| out.lock().unwrap().push(e.text.clone()));
        let err = Arc::clone(&logged);
        commander
            .events()
            .subscribe_error(move |e| err.lock().unwrap().push(e.text.clone()));

        let result = commander
            .install_package_detailed("lodash", "", DependencyType::Standard, false)
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("install timed out"));
        assert_eq!(model.refresh_count(), 1);
        assert_eq!(model.exception_count(), 0);

        let logged = logged.lock().unwrap();
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0].trim(), "added 40 packages");
        assert_eq!(logged[1].trim(), "npm WARN partial");
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-npm-here");
        let cmd = CommandDescriptor::update(&[], context(dir.path(), &missing)).unwrap();

        let result = NpmRunner::default().execute(&cmd, CommandHandle::new()).await;

        assert!(matches!(result, Err(Error::ToolNotFound(_))));
    }
}
