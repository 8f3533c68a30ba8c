//! Sub-agent port - interface to the external text-generation capability.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{SubagentRequest, SubagentResponse};

/// Trait for the external capability that executes a sub-agent's task.
///
/// The capability is owned by an external provider. Implementations must be
/// cancel-safe: the refinement controller drops the returned future when the
/// task is cancelled or the per-call timeout elapses.
#[async_trait]
pub trait SubagentInvoker: Send + Sync {
    /// Human-readable name of the backing provider.
    fn name(&self) -> &str;

    /// Run the request and return the sub-agent's output.
    ///
    /// Refinement attempts carry the previous response and a feedback message
    /// in the request.
    async fn invoke(&self, request: SubagentRequest) -> DomainResult<SubagentResponse>;
}
