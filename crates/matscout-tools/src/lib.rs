//! # matscout-tools
//!
//! The standard tools exposed to the matscout agent.
//!
//! | Name                 | Does                                              |
//! |----------------------|---------------------------------------------------|
//! | `search_by_material` | fuzzy name lookup in the materials table          |
//! | `search_by_property` | rank by target values and/or filter by ranges     |
//! | `add_material`       | append a material with whatever properties resolve |
//! | `wikipedia_search`   | encyclopedia text search                          |
//! | `arxiv_search`       | preprint archive text search                      |
//! | `final_answer`       | terminal: ends the run with its argument          |
//!
//! The store tools share one `MaterialStore` behind a lock, so a material
//! added during a run is visible to later searches in the same run.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use matscout_contracts::error::{HarnessError, HarnessResult};
use matscout_core::{
    registry::ToolRegistry,
    traits::{TextSearch, Tool, TraceSink},
};
use matscout_store::MaterialStore;

pub mod answer;
pub mod material;
pub mod property;
pub mod search;

pub use answer::FinalAnswer;
pub use material::{AddMaterial, SearchByMaterial};
pub use property::SearchByProperty;
pub use search::SearchTool;

/// The materials table as shared by the store tools.
pub type SharedStore = Arc<RwLock<MaterialStore>>;

pub fn shared(store: MaterialStore) -> SharedStore {
    Arc::new(RwLock::new(store))
}

pub(crate) fn read_store(store: &SharedStore) -> HarnessResult<RwLockReadGuard<'_, MaterialStore>> {
    store.read().map_err(|e| HarnessError::Store {
        reason: format!("material store lock poisoned: {}", e),
    })
}

pub(crate) fn write_store(store: &SharedStore) -> HarnessResult<RwLockWriteGuard<'_, MaterialStore>> {
    store.write().map_err(|e| HarnessError::Store {
        reason: format!("material store lock poisoned: {}", e),
    })
}

/// The six standard tools, in prompt order.
pub fn standard_tools(
    store: SharedStore,
    encyclopedia: Arc<dyn TextSearch>,
    archive: Arc<dyn TextSearch>,
) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(SearchTool::wikipedia(encyclopedia)),
        Box::new(SearchTool::arxiv(archive)),
        Box::new(SearchByMaterial::new(Arc::clone(&store))),
        Box::new(SearchByProperty::new(Arc::clone(&store))),
        Box::new(AddMaterial::new(store)),
        Box::new(FinalAnswer::new()),
    ]
}

/// A registry over `standard_tools`, tracing into `sink`.
pub fn standard_registry(
    store: SharedStore,
    encyclopedia: Arc<dyn TextSearch>,
    archive: Arc<dyn TextSearch>,
    sink: Arc<dyn TraceSink>,
) -> HarnessResult<ToolRegistry> {
    ToolRegistry::new(standard_tools(store, encyclopedia, archive), sink)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::{json, Value};

    use matscout_contracts::{tool::ToolArgs, trace::TraceEvent};
    use matscout_store::StoreSettings;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Search backend that echoes the query and remembers it.
    struct Echo {
        label: &'static str,
        queries: Arc<Mutex<Vec<String>>>,
    }

    impl TextSearch for Echo {
        fn search(&self, query: &str) -> HarnessResult<String> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(format!("{} result for '{}'", self.label, query))
        }
    }

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<TraceEvent>>,
    }

    impl TraceSink for Collect {
        fn record(&self, event: &TraceEvent) -> HarnessResult<u64> {
            let mut events = self.events.lock().unwrap();
            events.push(event.clone());
            Ok(events.len() as u64 - 1)
        }
    }

    const TABLE: &str = "\
Material,Density,Yield strength min,Yield strength max
Copper,8.96,70,220
Aluminum,2.7,30,280
Iron,7.87,80,300
Wood,0.6,30,100
";

    struct Fixture {
        registry: ToolRegistry,
        store: SharedStore,
        queries: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let store = shared(MaterialStore::from_reader(TABLE.as_bytes(), StoreSettings::default()).unwrap());
        let queries = Arc::new(Mutex::new(Vec::new()));
        let registry = standard_registry(
            Arc::clone(&store),
            Arc::new(Echo { label: "wiki", queries: Arc::clone(&queries) }),
            Arc::new(Echo { label: "arxiv", queries: Arc::clone(&queries) }),
            Arc::new(Collect::default()),
        )
        .unwrap();
        Fixture { registry, store, queries }
    }

    fn kw(pairs: &[(&str, Value)]) -> ToolArgs {
        ToolArgs::keywords(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    // ── Registry ──────────────────────────────────────────────────────────────

    #[test]
    fn standard_registry_lists_six_tools_with_one_terminal() {
        let f = fixture();
        assert_eq!(
            f.registry.names().collect::<Vec<_>>(),
            vec![
                "wikipedia_search",
                "arxiv_search",
                "search_by_material",
                "search_by_property",
                "add_material",
                "final_answer",
            ]
        );
        let terminal: Vec<&str> = f.registry.names().filter(|n| f.registry.is_terminal(n)).collect();
        assert_eq!(terminal, vec!["final_answer"]);
    }

    // ── search_by_material ────────────────────────────────────────────────────

    #[test]
    fn material_search_returns_records() {
        let f = fixture();
        let value = f
            .registry
            .dispatch("search_by_material", &ToolArgs::positional(vec![json!("wood")]))
            .unwrap();
        assert_eq!(
            value,
            json!([{
                "Material": "Wood",
                "Density": 0.6,
                "Yield strength min": 30.0,
                "Yield strength max": 100.0,
            }])
        );
    }

    #[test]
    fn unmatched_material_is_an_error_value() {
        let f = fixture();
        let value = f
            .registry
            .dispatch("search_by_material", &kw(&[("material", json!("Zzzqqq"))]))
            .unwrap();
        assert_eq!(value, json!("Error: no close matches found for material 'Zzzqqq'"));
    }

    // ── search_by_property ────────────────────────────────────────────────────

    #[test]
    fn numeric_targets_rank_materials() {
        let f = fixture();
        let value = f
            .registry
            .dispatch("search_by_property", &kw(&[("properties", json!({ "density": 7.0 }))]))
            .unwrap();
        let order: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["Material"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["Iron", "Copper", "Aluminum", "Wood"]);
        assert!(value[0]["distances"]["Density"].is_number());
    }

    #[test]
    fn range_objects_filter_materials() {
        let f = fixture();
        let value = f
            .registry
            .dispatch(
                "search_by_property",
                &kw(&[("properties", json!({ "Yield strength": { "min": 250.0 }, "Density": { "max": 5 } }))]),
            )
            .unwrap();
        assert_eq!(value, json!(["Aluminum"]));
    }

    #[test]
    fn ranges_and_targets_combine() {
        let f = fixture();
        let value = f
            .registry
            .dispatch(
                "search_by_property",
                &kw(&[("properties", json!({ "Density": 8.0, "Yield strength": { "min": 250 } }))]),
            )
            .unwrap();
        let order: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["Material"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["Iron", "Aluminum"]);
    }

    #[test]
    fn empty_results_read_as_a_message() {
        let f = fixture();
        let value = f
            .registry
            .dispatch("search_by_property", &kw(&[("properties", json!({ "Density": { "min": 100 } }))]))
            .unwrap();
        assert_eq!(value, json!(property::NO_MATCHES));
    }

    #[test]
    fn malformed_property_specs_are_rejected() {
        let f = fixture();
        for spec in [json!({}), json!({ "Density": "heavy" }), json!({ "Density": {} })] {
            let err = f
                .registry
                .dispatch("search_by_property", &kw(&[("properties", spec.clone())]))
                .unwrap_err();
            assert!(
                err.to_string().starts_with("invalid arguments for tool 'search_by_property'"),
                "{} should be rejected, got: {}",
                spec,
                err
            );
        }
    }

    #[test]
    fn unknown_property_is_an_error_value() {
        let f = fixture();
        let value = f
            .registry
            .dispatch("search_by_property", &kw(&[("properties", json!({ "Zzzqqq": 1 }))]))
            .unwrap();
        assert_eq!(value, json!("Error: could not find property 'Zzzqqq'"));
    }

    // ── add_material ──────────────────────────────────────────────────────────

    #[test]
    fn added_materials_are_searchable() {
        let f = fixture();
        let reply = f
            .registry
            .dispatch(
                "add_material",
                &kw(&[
                    ("material", json!("Titanium")),
                    ("properties", json!({ "density": 4.5, "yield strength": "800-1100" })),
                ]),
            )
            .unwrap();
        assert_eq!(reply, json!("Material 'Titanium' added to the database."));
        assert_eq!(f.store.read().unwrap().len(), 5);

        let found = f
            .registry
            .dispatch("search_by_material", &ToolArgs::positional(vec![json!("titanium")]))
            .unwrap();
        assert_eq!(found[0]["Yield strength max"], json!(1100.0));
    }

    #[test]
    fn add_material_rejects_non_scalar_values() {
        let f = fixture();
        let err = f
            .registry
            .dispatch(
                "add_material",
                &kw(&[("material", json!("Glass")), ("properties", json!({ "density": [1, 2] }))]),
            )
            .unwrap_err();
        assert!(err.to_string().contains("value for 'density'"));
        assert_eq!(f.store.read().unwrap().len(), 4);
    }

    // ── Text search and final_answer ──────────────────────────────────────────

    #[test]
    fn search_tools_delegate_to_their_backend() {
        let f = fixture();
        let wiki = f
            .registry
            .dispatch("wikipedia_search", &kw(&[("query", json!("cutting board materials"))]))
            .unwrap();
        assert_eq!(wiki, json!("wiki result for 'cutting board materials'"));

        let arxiv = f
            .registry
            .dispatch("arxiv_search", &ToolArgs::positional(vec![json!("steel cookware")]))
            .unwrap();
        assert_eq!(arxiv, json!("arxiv result for 'steel cookware'"));
        assert_eq!(f.queries.lock().unwrap().len(), 2);
    }

    #[test]
    fn final_answer_takes_exactly_one_string() {
        let f = fixture();
        assert_eq!(
            f.registry
                .dispatch("final_answer", &ToolArgs::positional(vec![json!("Wood")]))
                .unwrap(),
            json!("Wood")
        );
        assert!(f.registry.dispatch("final_answer", &ToolArgs::default()).is_err());
        assert!(f
            .registry
            .dispatch("final_answer", &ToolArgs::positional(vec![json!("a"), json!("b")]))
            .is_err());
        assert!(f
            .registry
            .dispatch("final_answer", &ToolArgs::positional(vec![json!(3)]))
            .is_err());
    }
}
