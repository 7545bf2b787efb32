//! The single-task episode loop.
//!
//! Drives one task to completion: alternate environment steps with agent
//! decisions, record the observation/action history, then invoke the judge
//! once over the finished sequence. Every abnormal condition (parse failure,
//! collaborator failure, backend-reported completion) ends the episode with
//! whatever partial trajectory was captured; nothing here aborts the worker.

use tracing::{debug, warn};

use crate::agent::BrowserAgent;
use crate::env::{Environment, NormalizedAction};
use crate::judge::TrajectoryJudge;
use crate::parsers::ParseResult;
use crate::trajectory::{ActionRecord, AgentResponseKey, Judgment, TrajectoryOutput};

/// Runs one episode against `env`, bounded by `max_actions` decisions.
///
/// The observation and action lists in the returned output are positionally
/// aligned; actions lag observations by at most one (a backend-terminated
/// episode records the final observation with no paired action).
pub async fn run_episode(
    env: &mut dyn Environment,
    agent: &mut BrowserAgent,
    judge: &TrajectoryJudge,
    url: &str,
    instruction: &str,
    max_actions: usize,
    agent_response_key: AgentResponseKey,
) -> TrajectoryOutput {
    let mut observations = Vec::new();
    let mut actions: Vec<ActionRecord> = Vec::new();

    agent.reset();

    // The operation accepted last turn, waiting to be sent to the backend.
    let mut pending: Option<NormalizedAction> = None;

    for step in 0..max_actions {
        let outcome = match &pending {
            None => env.reset(url).await.map(|obs| obs.map(|o| (o, false))),
            Some(action) => env
                .step(action)
                .await
                .map(|s| s.map(|s| (s.observation, s.done))),
        };

        let (mut observation, done) = match outcome {
            Ok(Some(outputs)) => outputs,
            Ok(None) => {
                warn!(step, "Environment produced no observation; ending episode");
                break;
            }
            Err(e) => {
                warn!(step, error = %e, "Environment call failed; ending episode");
                break;
            }
        };

        if done {
            debug!(step, "Environment reported completion");
            break;
        }

        observation.normalize_metadata();
        let current_url = observation.current_url.clone();
        let processed_text = observation.processed_text.clone();
        observations.push(observation);

        let decision = match agent.decide(&processed_text, &current_url, instruction).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(step, error = %e, "Agent model call failed; ending episode");
                break;
            }
        };

        match decision {
            ParseResult::Parsed {
                value,
                response,
                matched_response,
            } => {
                actions.push(ActionRecord {
                    function_calls: value.function_calls.clone(),
                    response: response.clone(),
                    matched_response: Some(matched_response),
                });

                if value.is_stop() {
                    debug!(step, "Agent issued stop");
                    break;
                }

                agent.push_action(instruction, &current_url, &response);
                pending = Some(NormalizedAction::new(value.function_calls));
            }
            ParseResult::Failed { response, .. } => {
                // No actionable decision: record the raw text and end.
                actions.push(ActionRecord {
                    function_calls: Vec::new(),
                    response,
                    matched_response: None,
                });
                debug!(step, "Agent response failed validation; ending episode");
                break;
            }
        }
    }

    let judgment = evaluate(judge, &observations, &actions, instruction, agent_response_key).await;

    TrajectoryOutput {
        observations,
        actions,
        judgment,
    }
}

async fn evaluate(
    judge: &TrajectoryJudge,
    observations: &[crate::trajectory::Observation],
    actions: &[ActionRecord],
    instruction: &str,
    agent_response_key: AgentResponseKey,
) -> Judgment {
    if observations.is_empty() {
        // Nothing to evaluate; the null-scored record still gets persisted
        // so "no artifact" keeps meaning "not attempted".
        return Judgment::empty(String::new());
    }

    let obs_texts: Vec<String> = observations
        .iter()
        .map(|o| o.processed_text.clone())
        .collect();
    let action_texts: Vec<Option<String>> = actions
        .iter()
        .map(|a| agent_response_key.select(a).map(String::from))
        .collect();

    match judge.evaluate(&obs_texts, &action_texts, instruction).await {
        Ok(judgment) => judgment,
        Err(e) => {
            warn!(error = %e, "Judge model call failed; recording null judgment");
            Judgment::empty(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::judge::JudgeConfig;
    use crate::pipeline::testing::{env_step, observation, MockEnvironment, ScriptedModel};
    use crate::agent::AgentConfig;

    const STOP_RESPONSE: &str = "Task complete.\n```json\n{\"action_key\": \"stop\", \"action_kwargs\": {\"answer\": \"done\"}, \"target_element_id\": null}\n```";
    const CLICK_RESPONSE: &str = "Clicking.\n```json\n{\"action_key\": \"click\", \"action_kwargs\": {}, \"target_element_id\": 3}\n```";
    const JUDGE_RESPONSE: &str = "Analysis.\n```json\n{\"success\": 1.0}\n```";

    fn judge(model: Arc<ScriptedModel>) -> TrajectoryJudge {
        TrajectoryJudge::new(model, JudgeConfig::default())
    }

    fn agent(model: Arc<ScriptedModel>) -> BrowserAgent {
        BrowserAgent::new(model, AgentConfig::default())
    }

    #[tokio::test]
    async fn test_stop_on_first_decision() {
        // One reset observation, stop immediately: one obs, one action,
        // and the environment is never stepped.
        let mut env = MockEnvironment::new(vec![Some(env_step("page one", false))]);
        let model = Arc::new(ScriptedModel::new(vec![STOP_RESPONSE, JUDGE_RESPONSE]));
        let mut browser_agent = agent(model.clone());
        let trajectory_judge = judge(model.clone());

        let output = run_episode(
            &mut env,
            &mut browser_agent,
            &trajectory_judge,
            "http://example.com",
            "do the thing",
            1,
            AgentResponseKey::Response,
        )
        .await;

        assert_eq!(output.observations.len(), 1);
        assert_eq!(output.actions.len(), 1);
        assert_eq!(output.actions[0].function_calls[0].dotpath, "stop");
        assert_eq!(env.resets(), 1);
        assert_eq!(env.steps(), 0);
        assert_eq!(output.judgment.success, Some(1.0));
    }

    #[tokio::test]
    async fn test_parse_failure_ends_episode_without_env_call() {
        let mut env = MockEnvironment::new(vec![
            Some(env_step("page one", false)),
            Some(env_step("page two", false)),
        ]);
        let model = Arc::new(ScriptedModel::new(vec![
            "I have no idea what to do here.",
            JUDGE_RESPONSE,
        ]));
        let mut browser_agent = agent(model.clone());
        let trajectory_judge = judge(model.clone());

        let output = run_episode(
            &mut env,
            &mut browser_agent,
            &trajectory_judge,
            "http://example.com",
            "task",
            10,
            AgentResponseKey::Response,
        )
        .await;

        assert_eq!(output.actions.len(), 1);
        assert_eq!(output.actions[0].matched_response, None);
        assert!(output.actions[0].function_calls.is_empty());
        // The second scripted step was never requested.
        assert_eq!(env.steps(), 0);
    }

    #[tokio::test]
    async fn test_backend_done_ends_without_recording_final_observation() {
        let mut env = MockEnvironment::new(vec![
            Some(env_step("page one", false)),
            Some(env_step("final page", true)),
        ]);
        let model = Arc::new(ScriptedModel::new(vec![CLICK_RESPONSE, JUDGE_RESPONSE]));
        let mut browser_agent = agent(model.clone());
        let trajectory_judge = judge(model.clone());

        let output = run_episode(
            &mut env,
            &mut browser_agent,
            &trajectory_judge,
            "http://example.com",
            "task",
            10,
            AgentResponseKey::Response,
        )
        .await;

        assert_eq!(output.observations.len(), 1);
        assert_eq!(output.actions.len(), 1);
        assert_eq!(env.steps(), 1);
    }

    #[tokio::test]
    async fn test_none_observation_yields_null_judgment_without_judge_call() {
        let mut env = MockEnvironment::new(vec![None]);
        let model = Arc::new(ScriptedModel::new(vec![]));
        let mut browser_agent = agent(model.clone());
        let trajectory_judge = judge(model.clone());

        let output = run_episode(
            &mut env,
            &mut browser_agent,
            &trajectory_judge,
            "http://example.com",
            "task",
            10,
            AgentResponseKey::Response,
        )
        .await;

        assert!(output.observations.is_empty());
        assert!(output.actions.is_empty());
        assert_eq!(output.judgment.success, None);
        // Neither the agent nor the judge was ever called.
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_max_actions_bounds_the_loop() {
        let steps: Vec<_> = (0..10).map(|i| Some(env_step(&format!("page {}", i), false))).collect();
        let mut env = MockEnvironment::new(steps);
        let model = Arc::new(ScriptedModel::new(vec![
            CLICK_RESPONSE,
            CLICK_RESPONSE,
            CLICK_RESPONSE,
            JUDGE_RESPONSE,
        ]));
        let mut browser_agent = agent(model.clone());
        let trajectory_judge = judge(model.clone());

        let output = run_episode(
            &mut env,
            &mut browser_agent,
            &trajectory_judge,
            "http://example.com",
            "task",
            3,
            AgentResponseKey::Response,
        )
        .await;

        assert_eq!(output.observations.len(), 3);
        assert_eq!(output.actions.len(), 3);
        // reset + two steps; the third accepted action is never executed.
        assert_eq!(env.resets(), 1);
        assert_eq!(env.steps(), 2);
    }

    #[tokio::test]
    async fn test_matched_response_key_hides_prose() {
        let mut env = MockEnvironment::new(vec![Some(env_step("page", false))]);
        let model = Arc::new(ScriptedModel::new(vec![STOP_RESPONSE, JUDGE_RESPONSE]));
        let mut browser_agent = agent(model.clone());
        let trajectory_judge = judge(model.clone());

        let output = run_episode(
            &mut env,
            &mut browser_agent,
            &trajectory_judge,
            "http://example.com",
            "task",
            1,
            AgentResponseKey::MatchedResponse,
        )
        .await;

        let matched = output.actions[0].matched_response.as_ref().unwrap();
        assert!(!matched.contains("Task complete."));

        // The judge saw the matched payload, not the surrounding prose.
        let judge_prompt = model.request_contents(1);
        assert!(judge_prompt.contains(matched.as_str()));
        assert!(!judge_prompt.contains("Task complete."));
    }

    #[test]
    fn test_observation_helper_shapes() {
        let obs = observation("text");
        assert_eq!(obs.processed_text, "text");
        assert!(obs.metadata.is_empty());
    }
}
