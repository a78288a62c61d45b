//! A project model backed by `package.json`.

use crate::config::NpmConfig;
use npmx_core::error::{Error, Result};
use npmx_core::{DependencyType, Module, ModuleSet, PackageModel, RootPackage};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, error, info, warn};

pub const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
}

impl From<Manifest> for RootPackage {
    fn from(manifest: Manifest) -> Self {
        let mut modules: BTreeMap<String, Module> = BTreeMap::new();
        let sections = [
            (manifest.dependencies, DependencyType::Standard),
            (manifest.optional_dependencies, DependencyType::Optional),
            (manifest.dev_dependencies, DependencyType::Development),
        ];

        // npm also lists optional dependencies under `dependencies`, so flags accumulate.
        for (section, dependency_type) in sections {
            for (name, version) in section {
                let module = modules
                    .entry(name.clone())
                    .or_insert_with(|| Module::new(name, version, DependencyType::Standard));
                match dependency_type {
                    DependencyType::Standard => {}
                    DependencyType::Optional => module.is_optional_dependency = true,
                    DependencyType::Development => module.is_dev_dependency = true,
                }
            }
        }

        RootPackage {
            name: manifest.name.unwrap_or_default(),
            version: manifest.version.unwrap_or_default(),
            modules: modules.into_values().collect::<ModuleSet>(),
        }
    }
}

/// Reads the root package from `<dir>/package.json`.
///
/// Returns `Ok(None)` when there is no manifest.
pub fn load_root_package(dir: &Path) -> Result<Option<RootPackage>> {
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(None);
    }

    let text = std::fs::read_to_string(&path)?;
    let manifest: Manifest = serde_json::from_str(&text)
        .map_err(|e| Error::Manifest(format!("{}: {}", path.display(), e)))?;
    Ok(Some(manifest.into()))
}

/// Project model for a directory containing a `package.json`.
///
/// Log sinks forward to `tracing`; the counters are kept for callers that
/// want to know whether anything went wrong.
#[derive(Debug)]
pub struct ProjectController {
    root_dir: PathBuf,
    config: NpmConfig,
    root: RwLock<Option<RootPackage>>,
    refreshes: AtomicUsize,
    exceptions: AtomicUsize,
}

impl ProjectController {
    /// Creates a controller and loads the manifest once.
    pub fn new(root_dir: impl Into<PathBuf>, config: NpmConfig) -> Self {
        let controller = Self {
            root_dir: root_dir.into(),
            config,
            root: RwLock::new(None),
            refreshes: AtomicUsize::new(0),
            exceptions: AtomicUsize::new(0),
        };
        controller.reload();
        controller
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn config(&self) -> &NpmConfig {
        &self.config
    }

    /// Number of refreshes requested after mutating commands.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Number of errors reported through the exception sink.
    pub fn exception_count(&self) -> usize {
        self.exceptions.load(Ordering::SeqCst)
    }

    fn reload(&self) {
        let root = match load_root_package(&self.root_dir) {
            Ok(Some(root)) => {
                debug!(
                    "Loaded {} with {} modules",
                    self.root_dir.join(MANIFEST_FILE).display(),
                    root.modules.len()
                );
                Some(root)
            }
            Ok(None) => {
                debug!("No {} in {}", MANIFEST_FILE, self.root_dir.display());
                None
            }
            Err(e) => {
                warn!("Failed to load root package: {}", e);
                None
            }
        };
        *self.root.write().unwrap_or_else(PoisonError::into_inner) = root;
    }
}

impl PackageModel for ProjectController {
    fn working_directory(&self) -> PathBuf {
        self.root_dir.clone()
    }

    fn tool_path(&self) -> Option<PathBuf> {
        self.config.npm_path.clone()
    }

    fn use_fallback(&self) -> bool {
        self.config.use_fallback
    }

    fn root_package(&self) -> Option<RootPackage> {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.reload();
    }

    fn log_output(&self, text: &str) {
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            info!(target: "npm", "{}", line);
        }
    }

    fn log_error(&self, text: &str) {
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            warn!(target: "npm", "{}", line);
        }
    }

    fn log_exception(&self, error: &Error) {
        self.exceptions.fetch_add(1, Ordering::SeqCst);
        error!(target: "npm", "{}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
      "name": "web-app",
      "version": "1.2.0",
      "dependencies": { "express": "^4.18.2", "fsevents": "^2.3.3" },
      "devDependencies": { "mocha": "^10.2.0" },
      "optionalDependencies": { "fsevents": "^2.3.3" }
    }"#;

    fn project(manifest: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        if let Some(text) = manifest {
            std::fs::write(dir.path().join(MANIFEST_FILE), text).unwrap();
        }
        dir
    }

    #[test]
    fn test_load_root_package() {
        let dir = project(Some(MANIFEST));
        let root = load_root_package(dir.path()).unwrap().unwrap();

        assert_eq!(root.name, "web-app");
        assert_eq!(root.version, "1.2.0");
        assert_eq!(root.modules.len(), 3);
        assert_eq!(root.dependency_type_of("express"), DependencyType::Standard);
        assert_eq!(
            root.dependency_type_of("mocha"),
            DependencyType::Development
        );
        assert_eq!(
            root.dependency_type_of("fsevents"),
            DependencyType::Optional
        );
    }

    #[test]
    fn test_missing_manifest() {
        let dir = project(None);
        assert_eq!(load_root_package(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_malformed_manifest() {
        let dir = project(Some("{ \"dependencies\": [1, 2] }"));
        assert!(matches!(
            load_root_package(dir.path()),
            Err(Error::Manifest(_))
        ));

        let controller = ProjectController::new(dir.path(), NpmConfig::default());
        assert_eq!(controller.root_package(), None);
    }

    #[test]
    fn test_refresh_picks_up_changes() {
        let dir = project(Some(r#"{ "name": "app" }"#));
        let controller = ProjectController::new(dir.path(), NpmConfig::default());
        assert!(controller.root_package().unwrap().modules.is_empty());

        std::fs::write(dir.path().join(MANIFEST_FILE), MANIFEST).unwrap();
        controller.refresh();

        assert_eq!(controller.refresh_count(), 1);
        assert_eq!(controller.root_package().unwrap().modules.len(), 3);
    }

    #[test]
    fn test_model_settings_come_from_config() {
        let dir = project(None);
        let config = NpmConfig {
            npm_path: Some(PathBuf::from("/opt/node/bin/npm")),
            use_fallback: false,
            ..NpmConfig::default()
        };
        let controller = ProjectController::new(dir.path(), config);

        let context = controller.tool_context();
        assert_eq!(context.working_dir, dir.path());
        assert_eq!(context.tool_path, Some(PathBuf::from("/opt/node/bin/npm")));
        assert!(!context.use_fallback);
    }

    #[test]
    fn test_exception_sink_counts() {
        let dir = project(None);
        let controller = ProjectController::new(dir.path(), NpmConfig::default());

        controller.log_exception(&Error::Other("npm crashed".into()));
        controller.log_output("added 1 package\n");
        controller.log_error("");

        assert_eq!(controller.exception_count(), 1);
    }
}
