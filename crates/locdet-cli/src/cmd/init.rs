use anyhow::Result;
use locdet_core::config::Config;
use locdet_core::{io, paths};
use std::path::Path;

/// Write a default `locdet.yaml` and create the data directory.
pub fn run(root: &Path) -> Result<()> {
    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("locdet is already initialized at {}", config_path.display());
        return Ok(());
    }

    let config = Config::new("locdet");
    config.save(root)?;
    io::ensure_dir(&paths::data_dir(root))?;

    println!("Initialized locdet at {}", config_path.display());
    println!("Edit the endpoints section before starting the server.");
    Ok(())
}
