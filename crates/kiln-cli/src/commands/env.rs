use super::{json_pretty, store_err, EXIT_SUCCESS};
use kiln_schema::{BuildpackId, LayerName};
use kiln_store::{LayerEnv, Mutation, Scope, StoreLayout, Verb};
use serde::Serialize;
use std::collections::BTreeMap;

/// One scope as recorded on disk plus what a consumer of it ends up with
/// when starting from an empty environment.
#[derive(Debug, Serialize)]
pub struct ScopeView {
    pub scope: Scope,
    pub mutations: Vec<Mutation>,
    pub resolved: BTreeMap<String, String>,
}

pub fn collect(
    layout: &StoreLayout,
    buildpack: &str,
    layer: &str,
    scope: Option<Scope>,
) -> Result<Vec<ScopeView>, String> {
    let bp = BuildpackId::parse(buildpack).map_err(|e| e.to_string())?;
    let name = LayerName::parse(layer).map_err(|e| e.to_string())?;
    if !layout.layer_dir(&bp, &name).is_dir() {
        return Err(format!("layer '{name}' not found for buildpack '{bp}'"));
    }
    let env = LayerEnv::read_from(&layout.layer_env_dir(&bp, &name)).map_err(store_err)?;
    let scopes = scope.map_or_else(|| Scope::ALL.to_vec(), |s| vec![s]);
    Ok(scopes
        .into_iter()
        .map(|scope| ScopeView {
            scope,
            mutations: env.scope(scope).mutations().to_vec(),
            resolved: env.materialized(scope).apply(&BTreeMap::new()),
        })
        .collect())
}

fn verb_name(verb: Verb) -> &'static str {
    match verb {
        Verb::Default => "default",
        Verb::Override => "override",
        Verb::Append => "append",
        Verb::Prepend => "prepend",
    }
}

pub fn run(
    layout: &StoreLayout,
    buildpack: &str,
    layer: &str,
    scope: Option<Scope>,
    json: bool,
) -> Result<u8, String> {
    let views = collect(layout, buildpack, layer, scope)?;
    if json {
        println!("{}", json_pretty(&views)?);
        return Ok(EXIT_SUCCESS);
    }
    for view in &views {
        println!("[{}]", view.scope);
        if view.mutations.is_empty() {
            println!("  (no mutations)");
        }
        for m in &view.mutations {
            match &m.delim {
                Some(delim) => println!(
                    "  {:<9} {}={} (delim {delim:?})",
                    verb_name(m.verb),
                    m.name,
                    m.value
                ),
                None => println!("  {:<9} {}={}", verb_name(m.verb), m.name, m.value),
            }
        }
        for (name, value) in &view.resolved {
            println!("  => {name}={value}");
        }
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_store::{LayerFlag, LayerStore};

    fn seeded() -> (tempfile::TempDir, StoreLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let bp = BuildpackId::parse("python").unwrap();
        let mut store = LayerStore::new(layout.clone(), bp, false).unwrap();
        let deps = store.layer("deps", &[LayerFlag::Build, LayerFlag::Launch]).unwrap();
        let env = store.env_mut(&deps).unwrap();
        env.shared_mut().prepend_var("PYTHONPATH", ":", "/layers/python/deps");
        env.build_mut().override_var("PIP_NO_CACHE_DIR", "1");
        store.finalize().unwrap();
        (dir, layout)
    }

    #[test]
    fn build_scope_sees_shared_mutations() {
        let (_dir, layout) = seeded();
        let views = collect(&layout, "python", "deps", Some(Scope::Build)).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].mutations.len(), 1);
        assert_eq!(views[0].resolved["PYTHONPATH"], "/layers/python/deps");
        assert_eq!(views[0].resolved["PIP_NO_CACHE_DIR"], "1");
    }

    #[test]
    fn all_scopes_in_order() {
        let (_dir, layout) = seeded();
        let views = collect(&layout, "python", "deps", None).unwrap();
        let scopes: Vec<Scope> = views.iter().map(|v| v.scope).collect();
        assert_eq!(scopes, Scope::ALL);
        assert!(views[1].mutations.is_empty());
        assert!(!views[1].resolved.contains_key("PIP_NO_CACHE_DIR"));
    }

    #[test]
    fn unknown_layer_is_an_error() {
        let (_dir, layout) = seeded();
        let err = collect(&layout, "python", "venv", None).unwrap_err();
        assert!(err.contains("not found"));
    }
}
