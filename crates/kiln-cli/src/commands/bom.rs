use super::{buildpack_ids, json_pretty, store_err, yes_no, EXIT_SUCCESS};
use kiln_schema::{BomEntry, BuildDescription, LaunchDescription};
use kiln_store::StoreLayout;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct BomRow {
    pub buildpack: String,
    #[serde(flatten)]
    pub entry: BomEntry,
}

fn read_toml<T: DeserializeOwned + Default>(path: &Path) -> Result<T, String> {
    if !path.exists() {
        return Ok(T::default());
    }
    let text = fs::read_to_string(path).map_err(store_err)?;
    toml::from_str(&text).map_err(|e| format!("store error: cannot parse {}: {e}", path.display()))
}

/// Entries from `launch.toml` followed by build-only entries from
/// `build.toml`. An entry flagged for both appears once.
pub fn collect(layout: &StoreLayout, buildpack: Option<&str>) -> Result<Vec<BomRow>, String> {
    let mut rows = Vec::new();
    for bp in buildpack_ids(layout, buildpack)? {
        let launch: LaunchDescription = read_toml(&layout.launch_file(&bp))?;
        let build: BuildDescription = read_toml(&layout.build_file(&bp))?;
        let mut entries = launch.bom;
        for entry in build.bom {
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        rows.extend(entries.into_iter().map(|entry| BomRow {
            buildpack: bp.to_string(),
            entry,
        }));
    }
    Ok(rows)
}

pub fn run(layout: &StoreLayout, buildpack: Option<&str>, json: bool) -> Result<u8, String> {
    let rows = collect(layout, buildpack)?;
    if json {
        println!("{}", json_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no bill-of-materials entries found");
    } else {
        println!(
            "{:<16} {:<20} {:<6} {:<7} METADATA",
            "BUILDPACK", "NAME", "BUILD", "LAUNCH"
        );
        for row in &rows {
            let metadata: Vec<String> = row
                .entry
                .metadata
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            println!(
                "{:<16} {:<20} {:<6} {:<7} {}",
                row.buildpack,
                row.entry.name,
                yes_no(row.entry.build),
                yes_no(row.entry.launch),
                metadata.join(" ")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
