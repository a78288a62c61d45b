//! The execution primitive trait.

use crate::command::{CommandDescriptor, CommandHandle, CommandOutcome};
use crate::error::Result;
use async_trait::async_trait;

/// Runs one command descriptor to completion.
///
/// A tool that ran and failed is reported as an `Ok` outcome with
/// `success == false`; `Err` is reserved for not being able to run or read
/// the tool at all. Implementations should stop the process when `handle`
/// is cancelled and still return an outcome.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        descriptor: &CommandDescriptor,
        handle: CommandHandle,
    ) -> Result<CommandOutcome>;
}
