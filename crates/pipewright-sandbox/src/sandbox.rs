use async_trait::async_trait;
use pipewright_catalog::ArtifactHandle;

use crate::envelope::{InputEnvelope, OutputEnvelope};
use crate::fault::SandboxFault;
use crate::limits::Limits;

/// Runs one artifact invocation in isolation.
///
/// Implementations must not share mutable state between invocations.
/// Dropping the returned future abandons the invocation.
#[async_trait]
pub trait Sandbox: Send + Sync {
  async fn run(
    &self,
    artifact: &ArtifactHandle,
    input: &InputEnvelope,
    limits: &Limits,
  ) -> Result<OutputEnvelope, SandboxFault>;
}
