use anyhow::Result;
use std::path::Path;

/// Start the API server on the given port.
pub fn run(root: &Path, port: u16) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let root_buf = root.to_path_buf();
    rt.block_on(async move { locdet_server::serve(root_buf, port).await })
}
