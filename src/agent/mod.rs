//! The browsing agent: turns observations into proposed actions.
//!
//! The agent keeps a running conversation per episode. Only the newest
//! observation is sent in full; earlier user turns are collapsed to a
//! placeholder so context stays bounded while the agent's own past responses
//! remain visible to it.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{GenerationRequest, Message, Model};
use crate::parsers::{parse_action, BrowserAction, ParseResult};

const SYSTEM_PROMPT: &str = "You are an agent that interacts with and navigates \
live webpages. Our goal is to complete an internet-based task by operating a \
virtual web browser.";

const USER_PROMPT_TEMPLATE: &str = "## Complete The Following Task

{instruction}

You are at {current_url} observing the viewport:

{observation}";

/// Stands in for observations from earlier turns.
const OMITTED_OBSERVATION: &str = "[earlier observation omitted]";

/// Configuration for the browsing agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier; empty string uses the client's default model.
    pub model: String,
    /// Sampling temperature for action generation.
    pub temperature: Option<f64>,
    /// Maximum tokens per action response.
    pub max_tokens: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: Some(0.5),
            max_tokens: Some(2048),
        }
    }
}

/// One completed agent turn, kept for conversational context.
#[derive(Debug, Clone)]
struct Turn {
    instruction: String,
    current_url: String,
    response: String,
}

/// LLM-backed browsing agent.
pub struct BrowserAgent {
    model: Arc<dyn Model>,
    config: AgentConfig,
    history: Vec<Turn>,
}

impl BrowserAgent {
    pub fn new(model: Arc<dyn Model>, config: AgentConfig) -> Self {
        Self {
            model,
            config,
            history: Vec::new(),
        }
    }

    /// Clears conversational state; called at the start of every episode.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Number of completed turns in the current episode.
    pub fn turns(&self) -> usize {
        self.history.len()
    }

    /// Records the agent's own response after the caller has accepted it, so
    /// the next decision sees it as an assistant turn.
    pub fn push_action(&mut self, instruction: &str, current_url: &str, response: &str) {
        self.history.push(Turn {
            instruction: instruction.to_string(),
            current_url: current_url.to_string(),
            response: response.to_string(),
        });
    }

    /// Asks the model for the next action given the current observation.
    ///
    /// Transport problems surface as `Err`; a response the parser cannot make
    /// sense of comes back as `Ok(ParseResult::Failed)` so the caller can
    /// record the raw text.
    pub async fn decide(
        &self,
        observation: &str,
        current_url: &str,
        instruction: &str,
    ) -> Result<ParseResult<BrowserAction>, LlmError> {
        let mut messages = Vec::with_capacity(2 + self.history.len() * 2);
        messages.push(Message::system(SYSTEM_PROMPT));

        for turn in &self.history {
            messages.push(Message::user(render_user_prompt(
                &turn.instruction,
                &turn.current_url,
                OMITTED_OBSERVATION,
            )));
            messages.push(Message::assistant(turn.response.clone()));
        }

        messages.push(Message::user(render_user_prompt(
            instruction,
            current_url,
            observation,
        )));

        let mut request = GenerationRequest::new(self.config.model.clone(), messages);
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.model.generate(request).await?;
        Ok(parse_action(&response))
    }
}

fn render_user_prompt(instruction: &str, current_url: &str, observation: &str) -> String {
    USER_PROMPT_TEMPLATE
        .replace("{instruction}", instruction)
        .replace("{current_url}", current_url)
        .replace("{observation}", observation)
}
