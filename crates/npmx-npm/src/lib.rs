//! npm backend for npmx.
//!
//! Resolves the npm executable, turns command descriptors into npm argument
//! lists, runs them as child processes and exposes a `package.json`-backed
//! project model.

pub mod args;
pub mod config;
pub mod controller;
pub mod resolve;
pub mod runner;
pub mod search;

pub use config::NpmConfig;
pub use controller::ProjectController;
pub use runner::NpmRunner;
