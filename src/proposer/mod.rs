//! Task proposal: designing new collection tasks for a website.
//!
//! Given a target site and optional context from previous runs, the proposer
//! asks a model for a new challenging task in a fixed JSON schema and
//! validates the response with [`parse_task_proposal`].

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{GenerationRequest, Message, Model};
use crate::parsers::{parse_task_proposal, ParseResult, TaskProposal};

const SYSTEM_PROMPT: &str = r#"You are a helpful assistant designing tasks for a web automation script. I will show you previous runs of the script, including previous tasks, webpages, actions, and performance reviews, formatted in markdown. Help me design *challenging* new tasks.

## Formatting The Proposed Task

Format your task in the following JSON schema:

```json
{
    "proposed_task": str,
    "steps": List[str],
    "criteria": str
}
```

Here is what each key means:

- `proposed_task`: A specific, challenging task that an expert user might leverage this website to complete.
    - Must not require making an account, logging in, submitting personal information, making a purchase, or placing an order.

- `steps`: Steps an expert user would follow to complete the proposed task.
- `criteria`: The required answer, and criteria to determine if the task was completed."#;

const USER_PROMPT_TEMPLATE: &str = "## Design A Task For The Following Website

{website}

{context}

Propose one new task as JSON in a fenced code block.";

/// Configuration for the task proposer.
#[derive(Debug, Clone)]
pub struct ProposerConfig {
    /// Model identifier; empty string uses the client's default model.
    pub model: String,
    /// Sampling temperature for proposal generation.
    pub temperature: Option<f64>,
    /// Maximum tokens per proposal response.
    pub max_tokens: Option<u32>,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: Some(0.7),
            max_tokens: Some(2048),
        }
    }
}

/// LLM-backed task proposer.
pub struct TaskProposer {
    model: Arc<dyn Model>,
    config: ProposerConfig,
}

impl TaskProposer {
    pub fn new(model: Arc<dyn Model>, config: ProposerConfig) -> Self {
        Self { model, config }
    }

    /// Proposes a new task for `website`.
    ///
    /// `previous_runs` is a markdown rendering of earlier trajectories on the
    /// site, or empty when proposing cold. Validation failures come back as
    /// `Ok(ParseResult::Failed)` with the raw response.
    pub async fn propose(
        &self,
        website: &str,
        previous_runs: &str,
    ) -> Result<ParseResult<TaskProposal>, LlmError> {
        let context = if previous_runs.is_empty() {
            "No previous runs are available for this website.".to_string()
        } else {
            format!("## Previous Runs\n\n{}", previous_runs)
        };

        let user_prompt = USER_PROMPT_TEMPLATE
            .replace("{website}", website)
            .replace("{context}", &context);

        let mut request = GenerationRequest::new(
            self.config.model.clone(),
            vec![Message::system(SYSTEM_PROMPT), Message::user(user_prompt)],
        );
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.model.generate(request).await?;
        Ok(parse_task_proposal(&response))
    }
}
