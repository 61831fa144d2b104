use super::{buildpack_ids, json_pretty, store_err, EXIT_SUCCESS};
use kiln_core::FINGERPRINT_KEY;
use kiln_schema::LayerName;
use kiln_store::{LayerFlags, LayerMetadataFile, StoreLayout};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LayerRow {
    pub buildpack: String,
    pub layer: String,
    pub flags: LayerFlags,
    pub fingerprint: Option<String>,
}

pub fn collect(layout: &StoreLayout, buildpack: Option<&str>) -> Result<Vec<LayerRow>, String> {
    let mut rows = Vec::new();
    for bp in buildpack_ids(layout, buildpack)? {
        for name in layout.list_layers(&bp).map_err(store_err)? {
            let layer = LayerName::parse(name.as_str()).map_err(store_err)?;
            let file = LayerMetadataFile::read(&layout.layer_metadata_file(&bp, &layer))
                .map_err(store_err)?
                .unwrap_or_default();
            rows.push(LayerRow {
                buildpack: bp.to_string(),
                layer: name,
                flags: file.types,
                fingerprint: file.metadata.get(FINGERPRINT_KEY).cloned(),
            });
        }
    }
    Ok(rows)
}

pub fn run(layout: &StoreLayout, buildpack: Option<&str>, json: bool) -> Result<u8, String> {
    let rows = collect(layout, buildpack)?;
    if json {
        println!("{}", json_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no layers found");
    } else {
        println!("{:<16} {:<16} {:<24} FINGERPRINT", "BUILDPACK", "LAYER", "FLAGS");
        for row in &rows {
            println!(
                "{:<16} {:<16} {:<24} {}",
                row.buildpack,
                row.layer,
                row.flags.to_string(),
                row.fingerprint.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_schema::BuildpackId;
    use kiln_store::{LayerFlag, LayerStore};

    #[test]
    fn rows_carry_flags_and_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let bp = BuildpackId::parse("go").unwrap();
        let mut store = LayerStore::new(layout.clone(), bp, false).unwrap();
        let gopath = store.layer("gopath", &[LayerFlag::Cache]).unwrap();
        store.set_metadata(&gopath, FINGERPRINT_KEY, "go:1.22").unwrap();
        store.layer("bin", &[LayerFlag::Launch]).unwrap();
        store.finalize().unwrap();

        let rows = collect(&layout, None).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.layer.as_str()).collect();
        assert_eq!(names, ["bin", "gopath"]);
        assert_eq!(rows[1].fingerprint.as_deref(), Some("go:1.22"));
        assert!(rows[1].flags.cache);
        assert!(rows[0].fingerprint.is_none());
    }
}
