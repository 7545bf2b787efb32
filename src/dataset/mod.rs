//! Task dataset loading.
//!
//! A dataset is a list of `{"domain": ..., "task": ...}` records, stored as
//! either a JSON array or JSON Lines. The domain doubles as the artifact
//! file stem, so it must be filesystem-safe.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::error::DatasetError;

/// One task to collect: a target site and the instruction to complete there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Target site, e.g. `awg-fittings.com`. Also the artifact file stem.
    pub domain: String,

    /// The instruction given to the agent.
    pub task: String,
}

impl TaskRecord {
    /// The address the environment session starts at.
    pub fn start_url(&self) -> String {
        format!("http://{}", self.domain)
    }
}

/// Loads a dataset from a JSON array file or a JSON Lines file, deciding by
/// extension (`.jsonl` means lines; anything else is parsed as an array).
pub async fn load_dataset(path: impl AsRef<Path>) -> Result<Vec<TaskRecord>, DatasetError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).await?;

    let records: Vec<TaskRecord> = if path.extension().is_some_and(|ext| ext == "jsonl") {
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?
    } else {
        serde_json::from_str(&contents)?
    };

    for record in &records {
        validate_domain(&record.domain)?;
    }

    info!(path = %path.display(), tasks = records.len(), "Loaded task dataset");
    Ok(records)
}

/// Rejects domains that would escape or mangle the artifact layout.
fn validate_domain(domain: &str) -> Result<(), DatasetError> {
    let ok = !domain.is_empty()
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        && !domain.starts_with('.');

    if ok {
        Ok(())
    } else {
        Err(DatasetError::InvalidDomain(domain.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    async fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_json_array() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "tasks.json",
            r#"[{"domain": "example.com", "task": "find the pricing page"}]"#,
        )
        .await;

        let records = load_dataset(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].domain, "example.com");
        assert_eq!(records[0].start_url(), "http://example.com");
    }

    #[tokio::test]
    async fn test_load_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "tasks.jsonl",
            "{\"domain\": \"a.com\", \"task\": \"t1\"}\n\n{\"domain\": \"b.org\", \"task\": \"t2\"}\n",
        )
        .await;

        let records = load_dataset(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].domain, "b.org");
    }

    #[tokio::test]
    async fn test_invalid_domain_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "tasks.json",
            r#"[{"domain": "../escape", "task": "t"}]"#,
        )
        .await;

        let err = load_dataset(&path).await.unwrap_err();
        assert!(matches!(err, DatasetError::InvalidDomain(d) if d == "../escape"));
    }

    #[tokio::test]
    async fn test_empty_domain_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "tasks.json", r#"[{"domain": "", "task": "t"}]"#).await;
        assert!(load_dataset(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "tasks.json", "not json").await;
        assert!(matches!(
            load_dataset(&path).await.unwrap_err(),
            DatasetError::Parse(_)
        ));
    }
}
