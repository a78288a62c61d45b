//! Package and dependency types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which section of the manifest a dependency lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyType {
    /// Regular runtime dependency (`dependencies`).
    #[default]
    Standard,
    /// Development-only dependency (`devDependencies`).
    Development,
    /// Optional dependency (`optionalDependencies`).
    Optional,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyType::Standard => write!(f, "standard"),
            DependencyType::Development => write!(f, "development"),
            DependencyType::Optional => write!(f, "optional"),
        }
    }
}

/// A package as reported by a registry search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package name.
    pub name: String,
    /// Latest published version.
    pub version: String,
    /// Package description.
    pub description: String,
    /// Author or publisher, if known.
    pub author: Option<String>,
    /// Registry keywords.
    pub keywords: Vec<String>,
    /// Publish date of the latest version.
    pub published: Option<DateTime<Utc>>,
}

impl Package {
    /// Creates a new Package with no author, keywords or publish date.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            author: None,
            keywords: Vec::new(),
            published: None,
        }
    }
}

/// A dependency declared by the root package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    /// Declared version range.
    pub version: String,
    pub is_dev_dependency: bool,
    pub is_optional_dependency: bool,
}

impl Module {
    /// Creates a module declared under the given dependency section.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        dependency_type: DependencyType,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            is_dev_dependency: dependency_type == DependencyType::Development,
            is_optional_dependency: dependency_type == DependencyType::Optional,
        }
    }

    /// The manifest section this module belongs to. Dev wins over optional.
    pub fn dependency_type(&self) -> DependencyType {
        if self.is_dev_dependency {
            DependencyType::Development
        } else if self.is_optional_dependency {
            DependencyType::Optional
        } else {
            DependencyType::Standard
        }
    }
}

/// The set of modules known to the root package, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSet {
    modules: BTreeMap<String, Module>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module, replacing any previous entry with the same name.
    pub fn insert(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), module);
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }
}

impl FromIterator<Module> for ModuleSet {
    fn from_iter<I: IntoIterator<Item = Module>>(iter: I) -> Self {
        let mut set = ModuleSet::new();
        for module in iter {
            set.insert(module);
        }
        set
    }
}

/// The top-level package of the project being managed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootPackage {
    pub name: String,
    pub version: String,
    pub modules: ModuleSet,
}

impl RootPackage {
    /// Classification used when removing `name` from the manifest.
    ///
    /// Unknown packages are treated as standard dependencies.
    pub fn dependency_type_of(&self, name: &str) -> DependencyType {
        self.modules
            .get(name)
            .map(Module::dependency_type)
            .unwrap_or_default()
    }
}
