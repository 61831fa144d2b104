pub mod bom;
pub mod env;
pub mod layers;
pub mod report;

use kiln_schema::BuildpackId;
use kiln_store::{StoreError, StoreLayout};
use std::path::Path;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_STORE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn store_err(e: impl Into<StoreError>) -> String {
    format!("store error: {}", e.into())
}

/// Open an existing layers root. Nothing is created.
pub fn open_layout(root: &Path) -> Result<StoreLayout, String> {
    let layout = StoreLayout::new(root);
    if !layout.layers_root().is_dir() {
        return Err(format!(
            "store error: no layers directory under {}",
            root.display()
        ));
    }
    layout.verify_version().map_err(store_err)?;
    debug!(root = %root.display(), "opened layers root");
    Ok(layout)
}

/// The requested buildpack, or every buildpack present in the root.
pub fn buildpack_ids(layout: &StoreLayout, filter: Option<&str>) -> Result<Vec<BuildpackId>, String> {
    if let Some(id) = filter {
        return BuildpackId::parse(id)
            .map(|id| vec![id])
            .map_err(|e| e.to_string());
    }
    Ok(layout
        .list_buildpacks()
        .map_err(store_err)?
        .into_iter()
        .filter_map(|id| BuildpackId::parse(id).ok())
        .collect())
}

pub fn colorize_outcome(outcome: &str) -> String {
    use console::Style;
    match outcome {
        "succeeded" => Style::new().green().apply_to(outcome).to_string(),
        "failed" => Style::new().red().bold().apply_to(outcome).to_string(),
        "opted in" => Style::new().cyan().apply_to(outcome).to_string(),
        "opted out" => Style::new().dim().apply_to(outcome).to_string(),
        other => other.to_owned(),
    }
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_layout(&dir.path().join("nope")).unwrap_err();
        assert!(err.starts_with("store error:"));
    }

    #[test]
    fn initialized_root_opens() {
        let dir = tempfile::tempdir().unwrap();
        StoreLayout::new(dir.path()).initialize().unwrap();
        assert!(open_layout(dir.path()).is_ok());
    }

    #[test]
    fn buildpack_filter_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        assert!(buildpack_ids(&layout, Some("../etc")).is_err());
        assert_eq!(buildpack_ids(&layout, Some("go")).unwrap().len(), 1);
    }

    #[test]
    fn buildpacks_listed_from_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        std::fs::create_dir_all(layout.layers_root().join("python")).unwrap();
        std::fs::create_dir_all(layout.layers_root().join("dotnet")).unwrap();
        let ids = buildpack_ids(&layout, None).unwrap();
        let names: Vec<&str> = ids.iter().map(BuildpackId::as_str).collect();
        assert_eq!(names, ["dotnet", "python"]);
    }

    #[test]
    fn unknown_outcome_is_passed_through() {
        assert_eq!(colorize_outcome("pending"), "pending");
    }
}
