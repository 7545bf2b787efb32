//! Artifact persistence for collected trajectories.
//!
//! Each episode produces three JSON artifacts keyed by domain:
//! `observations/<domain>.json`, `actions/<domain>.json`, and
//! `judgments/<domain>.json`. The judgment file doubles as the completion
//! marker for resumability: a domain whose judgment artifact exists is
//! finished. Screenshots are externalized to per-domain subdirectories so
//! the observation JSON stays small.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::StorageError;
use crate::trajectory::{ActionRecord, Judgment, Observation};

/// Paths for one collection run's artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    observations_dir: PathBuf,
    actions_dir: PathBuf,
    judgments_dir: PathBuf,
    screenshots_dir: PathBuf,
}

impl ArtifactStore {
    /// Lays the store out under a single output root.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        let output_dir = output_dir.as_ref();
        Self {
            observations_dir: output_dir.join("observations"),
            actions_dir: output_dir.join("actions"),
            judgments_dir: output_dir.join("judgments"),
            screenshots_dir: output_dir.join("screenshots"),
        }
    }

    /// Creates all artifact directories.
    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [
            &self.observations_dir,
            &self.actions_dir,
            &self.judgments_dir,
            &self.screenshots_dir,
        ] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::DirectoryCreationFailed(format!("{}: {}", dir.display(), e)))?;
        }
        Ok(())
    }

    pub fn observations_path(&self, domain: &str) -> PathBuf {
        self.observations_dir.join(format!("{}.json", domain))
    }

    pub fn actions_path(&self, domain: &str) -> PathBuf {
        self.actions_dir.join(format!("{}.json", domain))
    }

    pub fn judgment_path(&self, domain: &str) -> PathBuf {
        self.judgments_dir.join(format!("{}.json", domain))
    }

    /// Whether the completion marker for `domain` exists.
    pub fn judgment_exists(&self, domain: &str) -> bool {
        self.judgment_path(domain).exists()
    }

    /// Moves screenshot bytes out of the observations and onto disk as
    /// `screenshots/<domain>/screenshot_NN.jpg`, recording each path on its
    /// observation.
    pub async fn externalize_screenshots(
        &self,
        domain: &str,
        observations: &mut [Observation],
    ) -> Result<(), StorageError> {
        let domain_dir = self.screenshots_dir.join(domain);

        for (step, observation) in observations.iter_mut().enumerate() {
            let Some(bytes) = observation.screenshot.take() else {
                continue;
            };

            fs::create_dir_all(&domain_dir).await.map_err(|e| {
                StorageError::DirectoryCreationFailed(format!("{}: {}", domain_dir.display(), e))
            })?;

            let path = domain_dir.join(format!("screenshot_{:02}.jpg", step));
            fs::write(&path, bytes).await?;
            observation.screenshot_path = Some(path.to_string_lossy().into_owned());
        }

        Ok(())
    }

    pub async fn save_observations(
        &self,
        domain: &str,
        observations: &[Observation],
    ) -> Result<(), StorageError> {
        write_json(&self.observations_path(domain), observations).await
    }

    pub async fn save_actions(
        &self,
        domain: &str,
        actions: &[ActionRecord],
    ) -> Result<(), StorageError> {
        write_json(&self.actions_path(domain), actions).await
    }

    pub async fn save_judgment(
        &self,
        domain: &str,
        judgment: &Judgment,
    ) -> Result<(), StorageError> {
        write_json(&self.judgment_path(domain), judgment).await
    }

    pub async fn load_observations(&self, domain: &str) -> Result<Vec<Observation>, StorageError> {
        read_json(&self.observations_path(domain), domain, "observations").await
    }

    pub async fn load_actions(&self, domain: &str) -> Result<Vec<ActionRecord>, StorageError> {
        read_json(&self.actions_path(domain), domain, "actions").await
    }

    pub async fn load_judgment(&self, domain: &str) -> Result<Judgment, StorageError> {
        read_json(&self.judgment_path(domain), domain, "judgment").await
    }

    /// Domains that have a completed judgment artifact.
    pub async fn finished_domains(&self) -> Result<Vec<String>, StorageError> {
        let mut domains = Vec::new();
        let mut entries = match fs::read_dir(&self.judgments_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(domains),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(domain) = name.strip_suffix(".json") {
                domains.push(domain.to_string());
            }
        }

        domains.sort();
        Ok(domains)
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).await?;
    debug!(path = %path.display(), "Wrote artifact");
    Ok(())
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    path: &Path,
    domain: &str,
    artifact: &str,
) -> Result<T, StorageError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::MissingArtifact {
                domain: domain.to_string(),
                artifact: artifact.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&contents)?)
}

/// Identity of a collection run, persisted so resumed runs can verify the
/// shard plan still lines up with the artifacts already on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
    pub seed: u64,
    pub world_size: usize,
    pub num_workers: usize,
}

impl RunStamp {
    fn path(output_dir: &Path) -> PathBuf {
        output_dir.join("run_config.json")
    }

    /// Loads the stamp for `output_dir`, if one was written.
    pub async fn load(output_dir: impl AsRef<Path>) -> Result<Option<Self>, StorageError> {
        let path = Self::path(output_dir.as_ref());
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, output_dir: impl AsRef<Path>) -> Result<(), StorageError> {
        write_json(&Self::path(output_dir.as_ref()), self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::trajectory::{FunctionCall, TrajectoryOutput};

    fn observation(text: &str) -> Observation {
        Observation {
            current_url: "http://example.com".to_string(),
            processed_text: text.to_string(),
            raw_html: None,
            screenshot: None,
            screenshot_path: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let observations = vec![observation("viewport")];
        let actions = vec![ActionRecord {
            function_calls: vec![FunctionCall::new("page.go_back", serde_json::Map::new())],
            response: "going back".to_string(),
            matched_response: Some("{}".to_string()),
        }];
        let judgment = Judgment {
            success: Some(1.0),
            efficiency: None,
            self_correction: None,
            response: "done".to_string(),
            matched_response: None,
        };

        store
            .save_observations("example.com", &observations)
            .await
            .unwrap();
        store.save_actions("example.com", &actions).await.unwrap();
        store
            .save_judgment("example.com", &judgment)
            .await
            .unwrap();

        let loaded = TrajectoryOutput {
            observations: store.load_observations("example.com").await.unwrap(),
            actions: store.load_actions("example.com").await.unwrap(),
            judgment: store.load_judgment("example.com").await.unwrap(),
        };

        assert_eq!(loaded.observations.len(), 1);
        assert_eq!(loaded.observations[0].processed_text, "viewport");
        assert_eq!(loaded.actions[0].response, "going back");
        assert_eq!(loaded.judgment.success, Some(1.0));
    }

    #[tokio::test]
    async fn test_judgment_exists_is_the_completion_marker() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        assert!(!store.judgment_exists("example.com"));

        store
            .save_judgment("example.com", &Judgment::empty("".to_string()))
            .await
            .unwrap();

        assert!(store.judgment_exists("example.com"));
        assert_eq!(
            store.finished_domains().await.unwrap(),
            vec!["example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_artifact_error() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let err = store.load_judgment("nowhere.com").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::MissingArtifact { domain, .. } if domain == "nowhere.com"
        ));
    }

    #[tokio::test]
    async fn test_externalize_screenshots() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let mut observations = vec![observation("a"), observation("b")];
        observations[1].screenshot = Some(vec![0xFF, 0xD8, 0xFF]);

        store
            .externalize_screenshots("example.com", &mut observations)
            .await
            .unwrap();

        assert!(observations[0].screenshot_path.is_none());
        assert!(observations[1].screenshot.is_none());

        let path = observations[1].screenshot_path.as_ref().unwrap();
        assert!(path.ends_with("screenshot_01.jpg"));
        assert!(Path::new(path).exists());
    }

    #[tokio::test]
    async fn test_run_stamp_round_trip() {
        let dir = TempDir::new().unwrap();

        assert!(RunStamp::load(dir.path()).await.unwrap().is_none());

        let stamp = RunStamp {
            seed: 42,
            world_size: 4,
            num_workers: 8,
        };
        stamp.save(dir.path()).await.unwrap();

        assert_eq!(RunStamp::load(dir.path()).await.unwrap(), Some(stamp));
    }
}
