//! Filesystem blob store for blueprints and per-stage result artifacts.

use crate::analysis::AnalysisResult;
use crate::error::{DetectError, Result};
use crate::io::atomic_write;
use crate::paths;
use crate::stage::StageResult;
use std::path::{Path, PathBuf};

/// Blob keys are paths relative to the data root, so job records stay
/// portable across hosts.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -----------------------------------------------------------------------
    // Blueprints
    // -----------------------------------------------------------------------

    /// Store blueprint bytes, returning the relative blob key.
    pub fn store_blueprint(&self, job_id: &str, filename: &str, data: &[u8]) -> Result<String> {
        let path = paths::blueprint_path(&self.root, job_id, filename);
        atomic_write(&path, data)?;
        Ok(format!("blueprints/{job_id}/{filename}"))
    }

    pub fn read_blueprint(&self, job_id: &str, filename: &str) -> Result<Vec<u8>> {
        let path = paths::blueprint_path(&self.root, job_id, filename);
        Ok(std::fs::read(path)?)
    }

    /// Remove a stored blueprint (compensation when job creation fails late).
    pub fn delete_blueprint(&self, job_id: &str, filename: &str) -> Result<()> {
        let path = paths::blueprint_path(&self.root, job_id, filename);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Analysis results
    // -----------------------------------------------------------------------

    pub fn store_analysis(&self, job_id: &str, analysis: &AnalysisResult) -> Result<String> {
        let path = paths::analysis_path(&self.root, job_id);
        atomic_write(&path, &serde_json::to_vec(analysis)?)?;
        Ok(format!("cache/analysis/{job_id}/analysis.json"))
    }

    pub fn load_analysis(&self, job_id: &str) -> Result<AnalysisResult> {
        let path = paths::analysis_path(&self.root, job_id);
        if !path.exists() {
            return Err(DetectError::AnalysisNotFound(job_id.to_string()));
        }
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }

    // -----------------------------------------------------------------------
    // Stage results
    // -----------------------------------------------------------------------

    pub fn store_intermediate(&self, job_id: &str, result: &StageResult) -> Result<String> {
        let path = paths::intermediate_path(&self.root, job_id);
        atomic_write(&path, &serde_json::to_vec(result)?)?;
        Ok(format!("cache/intermediate/{job_id}/stage_2.json"))
    }

    pub fn load_intermediate(&self, job_id: &str) -> Result<StageResult> {
        let path = paths::intermediate_path(&self.root, job_id);
        if !path.exists() {
            return Err(DetectError::IntermediateNotFound(job_id.to_string()));
        }
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }

    pub fn store_final(&self, job_id: &str, result: &StageResult) -> Result<String> {
        let path = paths::final_path(&self.root, job_id);
        atomic_write(&path, &serde_json::to_vec(result)?)?;
        Ok(format!("cache/final/{job_id}/results.json"))
    }

    pub fn load_final(&self, job_id: &str) -> Result<Option<StageResult>> {
        let path = paths::final_path(&self.root, job_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&std::fs::read(path)?)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Stage, StageTimings};
    use chrono::Utc;
    use tempfile::TempDir;

    fn stage_result(stage: Stage) -> StageResult {
        StageResult {
            job_id: "job_1".into(),
            stage,
            rooms: vec![],
            processing_time_seconds: 0.1,
            timestamp: Utc::now(),
            timing_metrics: StageTimings {
                total_seconds: 0.1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn blueprint_roundtrip_and_delete() {
        let dir = TempDir::new().unwrap();
        let blobs = BlobStore::new(dir.path());
        let key = blobs
            .store_blueprint("job_1", "blueprint.png", b"\x89PNGdata")
            .unwrap();
        assert_eq!(key, "blueprints/job_1/blueprint.png");
        assert_eq!(blobs.read_blueprint("job_1", "blueprint.png").unwrap(), b"\x89PNGdata");

        blobs.delete_blueprint("job_1", "blueprint.png").unwrap();
        assert!(blobs.read_blueprint("job_1", "blueprint.png").is_err());
        // Deleting again is a no-op.
        blobs.delete_blueprint("job_1", "blueprint.png").unwrap();
    }

    #[test]
    fn analysis_roundtrip() {
        let dir = TempDir::new().unwrap();
        let blobs = BlobStore::new(dir.path());
        assert!(matches!(
            blobs.load_analysis("job_1"),
            Err(DetectError::AnalysisNotFound(_))
        ));
        blobs
            .store_analysis("job_1", &AnalysisResult::default())
            .unwrap();
        let loaded = blobs.load_analysis("job_1").unwrap();
        assert_eq!(loaded.metadata.pages, 1);
    }

    #[test]
    fn stage_results_roundtrip() {
        let dir = TempDir::new().unwrap();
        let blobs = BlobStore::new(dir.path());

        assert!(matches!(
            blobs.load_intermediate("job_1"),
            Err(DetectError::IntermediateNotFound(_))
        ));
        blobs
            .store_intermediate("job_1", &stage_result(Stage::Intermediate))
            .unwrap();
        assert_eq!(
            blobs.load_intermediate("job_1").unwrap().stage,
            Stage::Intermediate
        );

        assert!(blobs.load_final("job_1").unwrap().is_none());
        blobs.store_final("job_1", &stage_result(Stage::Final)).unwrap();
        assert_eq!(
            blobs.load_final("job_1").unwrap().unwrap().stage,
            Stage::Final
        );
    }
}
