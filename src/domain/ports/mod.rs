//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async trait interfaces external collaborators must
//! implement:
//! - SubagentInvoker: the capability that actually runs a sub-agent's task
//!
//! These traits keep the quality gate and refinement loop independent of any
//! particular model provider or transport.

pub mod subagent;

pub use subagent::SubagentInvoker;
