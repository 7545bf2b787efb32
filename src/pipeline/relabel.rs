//! Re-judging previously collected trajectories.
//!
//! Relabeling replays the judge over the observation/action artifacts
//! already on disk, without an environment or agent in the loop. It is how
//! a better judge model or prompt gets applied to an existing collection.

use tracing::{info, warn};

use crate::dataset::TaskRecord;
use crate::error::PipelineError;
use crate::judge::TrajectoryJudge;
use crate::storage::ArtifactStore;
use crate::trajectory::AgentResponseKey;

/// Re-judges every task whose observation and action artifacts exist.
///
/// Tasks with missing artifacts are skipped; the judgment artifact is
/// overwritten in place. Returns the domains that were relabeled.
pub async fn relabel_judgments(
    store: &ArtifactStore,
    judge: &TrajectoryJudge,
    dataset: &[TaskRecord],
    agent_response_key: AgentResponseKey,
) -> Result<Vec<String>, PipelineError> {
    let mut relabeled = Vec::new();

    for task in dataset {
        let observations = match store.load_observations(&task.domain).await {
            Ok(observations) => observations,
            Err(_) => {
                warn!(domain = %task.domain, "No observations artifact; skipping");
                continue;
            }
        };
        let actions = match store.load_actions(&task.domain).await {
            Ok(actions) => actions,
            Err(_) => {
                warn!(domain = %task.domain, "No actions artifact; skipping");
                continue;
            }
        };

        let obs_texts: Vec<String> = observations
            .iter()
            .map(|o| o.processed_text.clone())
            .collect();
        let action_texts: Vec<Option<String>> = actions
            .iter()
            .map(|a| agent_response_key.select(a).map(String::from))
            .collect();

        let judgment = match judge.evaluate(&obs_texts, &action_texts, &task.task).await {
            Ok(judgment) => judgment,
            Err(e) => {
                warn!(domain = %task.domain, error = %e, "Judge call failed; skipping");
                continue;
            }
        };

        store.save_judgment(&task.domain, &judgment).await?;
        info!(domain = %task.domain, success = ?judgment.success, "Relabeled");
        relabeled.push(task.domain.clone());
    }

    Ok(relabeled)
}
