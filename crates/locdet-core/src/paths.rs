//! Canonical on-disk layout under the service data root.
//!
//! Everything locdet persists lives below `<root>/.locdet/`.

use std::path::{Path, PathBuf};

pub fn data_dir(root: &Path) -> PathBuf {
    root.join(".locdet")
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join("locdet.yaml")
}

/// Embedded database holding jobs, feedback, and the preview cache.
pub fn db_path(root: &Path) -> PathBuf {
    data_dir(root).join("locdet.redb")
}

pub fn blueprint_path(root: &Path, job_id: &str, filename: &str) -> PathBuf {
    data_dir(root)
        .join("blueprints")
        .join(job_id)
        .join(filename)
}

pub fn analysis_path(root: &Path, job_id: &str) -> PathBuf {
    data_dir(root)
        .join("cache")
        .join("analysis")
        .join(job_id)
        .join("analysis.json")
}

pub fn intermediate_path(root: &Path, job_id: &str) -> PathBuf {
    data_dir(root)
        .join("cache")
        .join("intermediate")
        .join(job_id)
        .join("stage_2.json")
}

pub fn final_path(root: &Path, job_id: &str) -> PathBuf {
    data_dir(root)
        .join("cache")
        .join("final")
        .join(job_id)
        .join("results.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_under_data_dir() {
        let root = Path::new("/srv/locdet");
        assert_eq!(db_path(root), root.join(".locdet/locdet.redb"));
        assert_eq!(
            blueprint_path(root, "job_1", "blueprint.png"),
            root.join(".locdet/blueprints/job_1/blueprint.png")
        );
        assert_eq!(
            final_path(root, "job_1"),
            root.join(".locdet/cache/final/job_1/results.json")
        );
    }
}
