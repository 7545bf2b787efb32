//! Post-hoc evaluation of completed episodes.
//!
//! The judge sees the task instruction plus a windowed tail of the episode
//! (the newest observations and agent responses) and scores the run on
//! three axes. A response the parser cannot decode still produces a
//! [`Judgment`] record with null scores and the raw text retained, so a
//! relabeling pass can revisit it later.

use std::sync::Arc;

use tracing::warn;

use crate::error::LlmError;
use crate::llm::{GenerationRequest, Message, Model};
use crate::parsers::{parse_judgment, ParseResult};
use crate::trajectory::Judgment;

const SYSTEM_PROMPT: &str = r#"You are helping me evaluate a language model agent that interacts with and navigates live webpages. I will share a task provided to the agent, and a sequence of webpages and actions produced by the agent.

The agent produces actions as JSON in a fenced code block:

```json
{
    "action_key": str,
    "action_kwargs": dict,
    "target_element_id": int
}
```

## Evaluation Instructions

Based on the agent's trajectory, you are helping me determine if the agent's task has been completed successfully.

You will provide scores as JSON in a fenced code block:

```json
{
    "success": float,
    "efficiency": float,
    "self_correction": float
}
```

### Score Definitions

- `success`: Your confidence the agent's task has been completed successfully.
    - range: 0.0 (not possible) to 1.0 (absolutely certain).

- `efficiency`: Your confidence the agent has taken the most efficient path to complete the task.
    - range: 0.0 (not possible) to 1.0 (absolutely certain).

- `self_correction`: Your confidence the agent has demonstrated self-corrective behaviors during its completion of the task. These behaviors include backtracking to a more promising state, replanning when new information is discovered, and recognizing its own mistakes.
    - range: 0.0 (not possible) to 1.0 (absolutely certain).

Write a 300 word analysis that establishes rigorous success criteria for the task, and determines which criteria the agent has satisfied. After your response, provide your scores as JSON in a fenced code block."#;

const USER_PROMPT_TEMPLATE: &str = "## Evaluate The Following Task

{instruction}

Here is the agent's trajectory:

{summary}

After your 300 word analysis, provide your scores as JSON in a fenced code block.";

/// Configuration for the trajectory judge.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Model identifier; empty string uses the client's default model.
    pub model: String,
    /// Sampling temperature for judgment generation.
    pub temperature: Option<f64>,
    /// Maximum tokens per judgment response.
    pub max_tokens: Option<u32>,
    /// How many trailing observations the judge sees; `None` means all.
    pub last_obs: Option<usize>,
    /// How many trailing agent responses the judge sees; `None` means all.
    pub last_actions: Option<usize>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: Some(0.5),
            max_tokens: Some(2048),
            last_obs: Some(5),
            last_actions: Some(5),
        }
    }
}

/// LLM-backed evaluator for completed episodes.
pub struct TrajectoryJudge {
    model: Arc<dyn Model>,
    config: JudgeConfig,
}

impl TrajectoryJudge {
    pub fn new(model: Arc<dyn Model>, config: JudgeConfig) -> Self {
        Self { model, config }
    }

    /// Scores one completed episode.
    ///
    /// `observations` holds processed viewport text per step; `actions` holds
    /// the agent response text per step (`None` where the step produced no
    /// usable response). Transport failures surface as `Err`; an unparseable
    /// judge response yields a null-scored [`Judgment`] carrying the raw text.
    pub async fn evaluate(
        &self,
        observations: &[String],
        actions: &[Option<String>],
        instruction: &str,
    ) -> Result<Judgment, LlmError> {
        let summary = render_summary(
            observations,
            actions,
            self.config.last_obs,
            self.config.last_actions,
        );

        let user_prompt = USER_PROMPT_TEMPLATE
            .replace("{instruction}", instruction)
            .replace("{summary}", &summary);

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

        match parse_judgment(&response) {
            ParseResult::Parsed {
                value,
                response,
                matched_response,
            } => Ok(value.into_judgment(response, Some(matched_response))),
            ParseResult::Failed { response, .. } => {
                warn!("Judge response failed validation; keeping raw text with null scores");
                Ok(Judgment {
                    success: None,
                    efficiency: None,
                    self_correction: None,
                    response,
                    matched_response: None,
                })
            }
        }
    }
}

/// Interleaves the windowed tails of observations and agent responses into a
/// markdown transcript. Window bounds apply per sequence, measured from the
/// end of the episode.
fn render_summary(
    observations: &[String],
    actions: &[Option<String>],
    last_obs: Option<usize>,
    last_actions: Option<usize>,
) -> String {
    let obs_start = window_start(observations.len(), last_obs);
    let act_start = window_start(actions.len(), last_actions);

    let steps = observations.len().max(actions.len());
    let mut sections = Vec::new();

    for step in 0..steps {
        if step >= obs_start {
            if let Some(obs) = observations.get(step) {
                sections.push(format!("## Webpage\n\n{}", obs));
            }
        }
        if step >= act_start {
            if let Some(Some(response)) = actions.get(step) {
                sections.push(format!("## Action\n\n{}", response));
            }
        }
    }

    sections.join("\n\n")
}

fn window_start(len: usize, last: Option<usize>) -> usize {
    match last {
        Some(n) => len.saturating_sub(n),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    struct FixedModel {
        response: String,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl FixedModel {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Model for FixedModel {
        async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn obs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("viewport {}", i)).collect()
    }

    fn acts(n: usize) -> Vec<Option<String>> {
        (0..n).map(|i| Some(format!("response {}", i))).collect()
    }

    #[tokio::test]
    async fn test_evaluate_parses_scores() {
        let model = Arc::new(FixedModel::new(
            "Analysis.\n```json\n{\"success\": 1.0, \"efficiency\": 0.5, \"self_correction\": 0.0}\n```",
        ));
        let judge = TrajectoryJudge::new(model, JudgeConfig::default());

        let judgment = judge
            .evaluate(&obs(2), &acts(2), "find the price")
            .await
            .expect("model ok");

        assert_eq!(judgment.success, Some(1.0));
        assert_eq!(judgment.efficiency, Some(0.5));
        assert_eq!(judgment.self_correction, Some(0.0));
        assert!(judgment.matched_response.is_some());
    }

    #[tokio::test]
    async fn test_unparseable_judgment_keeps_raw_text() {
        let model = Arc::new(FixedModel::new("The agent did great, ten out of ten."));
        let judge = TrajectoryJudge::new(model, JudgeConfig::default());

        let judgment = judge
            .evaluate(&obs(1), &acts(1), "task")
            .await
            .expect("model ok");

        assert_eq!(judgment.success, None);
        assert_eq!(judgment.response, "The agent did great, ten out of ten.");
        assert_eq!(judgment.matched_response, None);
    }

    #[tokio::test]
    async fn test_window_limits_prompt_contents() {
        let model = Arc::new(FixedModel::new("```json\n{}\n```"));
        let judge = TrajectoryJudge::new(
            model.clone(),
            JudgeConfig {
                last_obs: Some(2),
                last_actions: Some(1),
                ..JudgeConfig::default()
            },
        );

        let _ = judge.evaluate(&obs(5), &acts(5), "task").await.unwrap();

        let requests = model.requests.lock().unwrap();
        let prompt = &requests[0].messages[1].content;

        assert!(!prompt.contains("viewport 2"));
        assert!(prompt.contains("viewport 3"));
        assert!(prompt.contains("viewport 4"));
        assert!(!prompt.contains("response 3"));
        assert!(prompt.contains("response 4"));
    }

    #[test]
    fn test_summary_interleaves_in_order() {
        let summary = render_summary(&obs(2), &acts(2), None, None);
        let o0 = summary.find("viewport 0").unwrap();
        let a0 = summary.find("response 0").unwrap();
        let o1 = summary.find("viewport 1").unwrap();
        let a1 = summary.find("response 1").unwrap();
        assert!(o0 < a0 && a0 < o1 && o1 < a1);
    }

    #[test]
    fn test_summary_skips_missing_responses() {
        let actions = vec![None, Some("response 1".to_string())];
        let summary = render_summary(&obs(2), &actions, None, None);
        assert!(!summary.contains("response 0"));
        assert!(summary.contains("response 1"));
    }

    #[test]
    fn test_summary_handles_action_lag() {
        // One more observation than actions, as a stop-terminated episode has.
        let summary = render_summary(&obs(3), &acts(2), None, None);
        assert!(summary.contains("viewport 2"));
        assert!(summary.ends_with("viewport 2"));
    }
}
