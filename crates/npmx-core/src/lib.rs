//! Core types and traits for npmx.
//!
//! This crate provides the command descriptor, the log event channel, the
//! collaborator traits implemented by backends and project models, and the
//! [`Commander`] that ties them together.

pub mod command;
pub mod commander;
pub mod error;
pub mod events;
pub mod model;
pub mod package;
pub mod runner;

pub use command::{CommandDescriptor, CommandHandle, CommandKind, CommandOutcome, ToolContext};
pub use commander::{Commander, OperationResult};
pub use error::{Error, Result};
pub use events::{LogChannel, LogEvent, LogSource, SubscriptionId};
pub use model::PackageModel;
pub use package::{DependencyType, Module, ModuleSet, Package, RootPackage};
pub use runner::CommandRunner;
