use crate::output::{print_json, print_table};
use anyhow::{Context, Result};
use locdet_core::analysis::AnalysisResult;
use locdet_core::rooms::detect_rooms;
use std::path::Path;

/// Run preview room detection over a stored analysis JSON file.
///
/// Useful for tuning the heuristics offline without a running server.
pub fn run(analysis_path: &Path, json: bool) -> Result<()> {
    let data = std::fs::read(analysis_path)
        .with_context(|| format!("failed to read '{}'", analysis_path.display()))?;
    let analysis: AnalysisResult = serde_json::from_slice(&data)
        .with_context(|| format!("'{}' is not a valid analysis file", analysis_path.display()))?;

    let rooms = detect_rooms(&analysis);

    if json {
        return print_json(&rooms);
    }

    let rows = rooms
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                format!(
                    "[{:.0}, {:.0}, {:.0}, {:.0}]",
                    r.bounding_box[0], r.bounding_box[1], r.bounding_box[2], r.bounding_box[3]
                ),
                format!("{:.2}", r.confidence),
                r.name_hint.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["ROOM", "BOUNDING BOX", "CONFIDENCE", "NAME HINT"], rows);
    println!("\n{} room(s) detected", rooms.len());
    Ok(())
}
