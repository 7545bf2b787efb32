//! HTTP adapter for a remote environment backend.
//!
//! Talks to a browser-driving service over a small JSON protocol:
//! `POST {endpoint}/reset {"url": ...}` and `POST {endpoint}/step
//! {"function_calls": [...]}`, each answering either a session payload or
//! `null` when the backend could not produce an observation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{EnvStep, Environment, EnvironmentFactory, NormalizedAction};
use crate::error::EnvError;
use crate::trajectory::Observation;

/// Default per-call timeout for environment requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Serialize)]
struct ResetRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct StepResponse {
    observation: Observation,
    #[serde(default)]
    done: bool,
}

/// Environment client bound to one backend endpoint.
pub struct RemoteEnvironment {
    endpoint: String,
    http_client: Client,
}

impl RemoteEnvironment {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http_client: Client::builder()
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// The endpoint this client is bound to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<StepResponse>, EnvError> {
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), path);

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EnvError::Timeout {
                        seconds: DEFAULT_TIMEOUT_SECS,
                    }
                } else {
                    EnvError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(EnvError::RequestFailed(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        // The backend answers `null` when no observation is available.
        response
            .json::<Option<StepResponse>>()
            .await
            .map_err(|e| EnvError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl Environment for RemoteEnvironment {
    async fn reset(&mut self, url: &str) -> Result<Option<Observation>, EnvError> {
        let step = self.post("reset", &ResetRequest { url }).await?;
        Ok(step.map(|s| s.observation))
    }

    async fn step(&mut self, action: &NormalizedAction) -> Result<Option<EnvStep>, EnvError> {
        let step = self.post("step", action).await?;
        Ok(step.map(|s| EnvStep {
            observation: s.observation,
            done: s.done,
        }))
    }
}

/// Factory producing [`RemoteEnvironment`] clients.
pub struct RemoteEnvironmentFactory;

impl EnvironmentFactory for RemoteEnvironmentFactory {
    fn create(&self, endpoint: &str) -> Box<dyn Environment> {
        Box::new(RemoteEnvironment::new(endpoint))
    }
}
