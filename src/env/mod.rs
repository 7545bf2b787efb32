//! Environment collaborator interface.
//!
//! The environment driver that actually renders pages and executes actions
//! is an external system; this crate consumes it through the narrow
//! [`Environment`] trait. A `None` from `reset` or `step` means the backend
//! could not produce an observation and the episode is unrecoverable.

pub mod remote;

use async_trait::async_trait;

use crate::error::EnvError;
use crate::trajectory::{FunctionCall, Observation};

pub use remote::RemoteEnvironment;

/// A normalized operation batch, ready for the execution interface.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalizedAction {
    pub function_calls: Vec<FunctionCall>,
}

impl NormalizedAction {
    pub fn new(function_calls: Vec<FunctionCall>) -> Self {
        Self { function_calls }
    }
}

/// One environment step outcome: the new observation, and whether the
/// backend considers the episode finished.
#[derive(Debug, Clone)]
pub struct EnvStep {
    pub observation: Observation,
    pub done: bool,
}

/// The environment collaborator.
///
/// `Ok(None)` from either call is an unrecoverable episode failure; an
/// `Err` (transport problem, timeout) is treated the same way by callers.
#[async_trait]
pub trait Environment: Send {
    /// Starts a fresh session at the given address.
    async fn reset(&mut self, url: &str) -> Result<Option<Observation>, EnvError>;

    /// Advances the session by one operation batch.
    async fn step(&mut self, action: &NormalizedAction) -> Result<Option<EnvStep>, EnvError>;
}

/// Creates [`Environment`] instances bound to a backend endpoint.
///
/// The orchestrator binds each logical worker to one endpoint from a fixed
/// pool; the factory hides which concrete driver is behind it.
pub trait EnvironmentFactory: Send + Sync {
    fn create(&self, endpoint: &str) -> Box<dyn Environment>;
}
