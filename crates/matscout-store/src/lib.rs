//! # matscout-store
//!
//! The structured materials table the agent's tools query.
//!
//! ## Overview
//!
//! A `MaterialStore` is a CSV table whose first column names each material.
//! Lookups are fuzzy: material names and property names are matched with a
//! weighted 0–100 similarity score (`fuzzy::wratio`) against configurable
//! thresholds. Property search either ranks records by distance to target
//! values or filters them by overlapping ranges. Appending adds a record
//! with whatever properties resolved and rewrites the backing file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use matscout_store::{MaterialStore, StoreSettings};
//!
//! let store = MaterialStore::load("materials.csv", StoreSettings::default())?;
//! let copper = store.find_by_name("copperr")?;
//! let ranked = store.find_by_properties(&[("density".into(), 3.0)])?;
//! ```

pub mod fuzzy;
pub mod store;
pub mod value;

pub use store::{MaterialStore, Property, PropertyKind, RankedRecord, Record, StoreSettings};
pub use value::{parse_value_text, AppendValue, FieldValue, ParsedValue, RangeQuery};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use matscout_contracts::error::HarnessError;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    const TABLE: &str = "\
Material,Density,Melting point,Yield strength min,Yield strength max
Copper,8.96,1085,70,220
Aluminum,2.70,660,30,280
Iron,7.87,1538,80,300
Wood,0.6,,30,100
";

    const RANGE_TABLE: &str = "\
Material,Density min,Density max,Melting point min,Melting point max
Copper,8.9,8.96,1083,1085
Aluminum,2.6,2.8,640,660
Iron,7.8,7.9,1530,1538
Wood,0.3,1.3,,
";

    fn range_store() -> MaterialStore {
        MaterialStore::from_reader(RANGE_TABLE.as_bytes(), StoreSettings::default()).unwrap()
    }

    fn store() -> MaterialStore {
        MaterialStore::from_reader(TABLE.as_bytes(), StoreSettings::default()).unwrap()
    }

    fn names(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    // ── Structure ─────────────────────────────────────────────────────────────

    #[test]
    fn header_splits_into_scalar_and_range_properties() {
        let store = store();
        assert_eq!(store.name_column(), "Material");
        assert_eq!(store.len(), 4);

        let properties: Vec<&str> = store.properties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(properties, vec!["Density", "Melting point", "Yield strength"]);
        assert_eq!(
            store.properties()[2].kind,
            PropertyKind::Range {
                min: Some("Yield strength min".into()),
                max: Some("Yield strength max".into()),
            }
        );
        assert_eq!(store.records()[3].get("Melting point"), Some(&FieldValue::Null));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = MaterialStore::from_rows(
            vec!["Material".into(), "Density".into()],
            vec![vec!["Copper".into()]],
            StoreSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::Store { ref reason } if reason.contains("row 1 has 1 cells")));
    }

    #[test]
    fn record_json_puts_the_name_first() {
        let store = store();
        assert_eq!(
            store.records()[3].to_json(store.name_column()),
            json!({
                "Material": "Wood",
                "Density": 0.6,
                "Melting point": null,
                "Yield strength min": 30.0,
                "Yield strength max": 100.0,
            })
        );
    }

    // ── find_by_name ──────────────────────────────────────────────────────────

    #[test]
    fn near_misses_find_the_material() {
        let store = store();
        assert_eq!(names(&store.find_by_name("Copperr").unwrap()), vec!["Copper"]);
        assert_eq!(names(&store.find_by_name("wood").unwrap()), vec!["Wood"]);
    }

    #[test]
    fn weak_matches_are_not_found() {
        let store = store();
        for query in ["Cu", "Zzzqqq", ""] {
            let err = store.find_by_name(query).unwrap_err();
            assert!(
                matches!(err, HarnessError::NotFound { query: ref q } if q == query),
                "'{}' should not match anything",
                query
            );
        }
    }

    #[test]
    fn every_record_sharing_a_name_is_returned() {
        let mut store = store();
        store.append("Copper", &[("density".into(), AppendValue::Number(8.9))]).unwrap();

        let found = store.find_by_name("copper").unwrap();
        assert_eq!(names(&found), vec!["Copper", "Copper"]);
        assert_eq!(found[1].get("Density"), Some(&FieldValue::Number(8.9)));
    }

    #[test]
    fn top_k_limits_candidate_names() {
        let settings = StoreSettings { top_k: 1, ..StoreSettings::default() };
        let store = MaterialStore::from_reader(
            "Material,Density\nSteel A,1\nSteel B,2\n".as_bytes(),
            settings,
        )
        .unwrap();
        assert_eq!(names(&store.find_by_name("steel").unwrap()), vec!["Steel A"]);
    }

    // ── find_by_properties ────────────────────────────────────────────────────

    #[test]
    fn records_rank_by_distance_to_scalar_targets() {
        let ranked = store().find_by_properties(&[("density".into(), 7.0)]).unwrap();
        let order: Vec<&str> = ranked.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(order, vec!["Iron", "Copper", "Aluminum", "Wood"]);
        assert!((ranked[0].total - 0.87).abs() < 1e-9);
        assert_eq!(ranked[0].distances[0].0, "Density");
    }

    #[test]
    fn targets_inside_a_range_are_distance_zero() {
        let ranked = store().find_by_properties(&[("yield strength".into(), 250.0)]).unwrap();
        let zero: Vec<&str> = ranked
            .iter()
            .filter(|r| r.total == 0.0)
            .map(|r| r.record.name.as_str())
            .collect();
        assert_eq!(zero, vec!["Aluminum", "Iron"], "ties keep table order");
        assert_eq!(ranked[2].record.name, "Copper");
        assert_eq!(ranked[2].total, 30.0);
        assert_eq!(ranked[3].total, 150.0);
    }

    #[test]
    fn records_missing_a_property_are_skipped() {
        let ranked = store()
            .find_by_properties(&[("density".into(), 3.0), ("melting point".into(), 700.0)])
            .unwrap();
        let order: Vec<&str> = ranked.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(order, vec!["Aluminum", "Copper", "Iron"]);
    }

    #[test]
    fn range_records_rank_by_summed_distance_to_the_nearest_bound() {
        let ranked = range_store()
            .find_by_properties(&[("density".into(), 2.7), ("melting".into(), 660.0)])
            .unwrap();
        let order: Vec<&str> = ranked.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(order, vec!["Aluminum", "Copper", "Iron"], "Wood has no melting point");
        assert_eq!(ranked[0].total, 0.0, "both targets fall inside Aluminum's ranges");
        assert!((ranked[1].total - 429.2).abs() < 1e-9, "got {}", ranked[1].total);
        assert!((ranked[2].total - 875.1).abs() < 1e-9, "got {}", ranked[2].total);
    }

    #[test]
    fn unknown_properties_fail_the_search() {
        let err = store().find_by_properties(&[("Zzzqqq".into(), 1.0)]).unwrap_err();
        assert!(matches!(err, HarnessError::UnknownProperty { ref property } if property == "Zzzqqq"));
    }

    // ── filter_by_ranges ──────────────────────────────────────────────────────

    #[test]
    fn range_filters_keep_overlapping_records() {
        let store = store();
        let strong = store
            .filter_by_ranges(&[("Yield strength".into(), RangeQuery::new(Some(250.0), None))])
            .unwrap();
        assert_eq!(names(&strong), vec!["Aluminum", "Iron"]);

        let light = store
            .filter_by_ranges(&[("density".into(), RangeQuery::new(None, Some(3.0)))])
            .unwrap();
        assert_eq!(names(&light), vec!["Aluminum", "Wood"]);

        let hot = store
            .filter_by_ranges(&[("melting".into(), RangeQuery::new(Some(0.0), None))])
            .unwrap();
        assert_eq!(names(&hot), vec!["Copper", "Aluminum", "Iron"], "null cells never match");
    }

    // ── append ────────────────────────────────────────────────────────────────

    #[test]
    fn partial_append_fills_resolved_properties_only() {
        let mut store = store();
        let record = store
            .append(
                "Titanium",
                &[
                    ("density".into(), AppendValue::Text("4.5".into())),
                    ("yield strength".into(), AppendValue::Text("800-1100".into())),
                    ("colour".into(), AppendValue::Text("grey".into())),
                ],
            )
            .unwrap();

        assert_eq!(store.len(), 5);
        assert_eq!(record.get("Density"), Some(&FieldValue::Number(4.5)));
        assert_eq!(record.get("Melting point"), Some(&FieldValue::Null));
        assert_eq!(record.get("Yield strength min"), Some(&FieldValue::Number(800.0)));
        assert_eq!(record.get("Yield strength max"), Some(&FieldValue::Number(1100.0)));
        assert_eq!(store.records().last(), Some(&record));
    }

    #[test]
    fn a_number_fills_both_range_bounds() {
        let mut store = store();
        let record = store
            .append("Glass", &[("Yield strength".into(), AppendValue::Number(50.0))])
            .unwrap();
        assert_eq!(record.get("Yield strength min"), Some(&FieldValue::Number(50.0)));
        assert_eq!(record.get("Yield strength max"), Some(&FieldValue::Number(50.0)));
    }

    #[test]
    fn a_bound_word_sets_only_that_bound() {
        let mut store = range_store();
        let record = store
            .append(
                "Testium",
                &[
                    ("Density min".into(), AppendValue::Number(2.6)),
                    ("density MAXIMUM".into(), AppendValue::Number(2.8)),
                    ("melting point upper".into(), AppendValue::Number(900.0)),
                ],
            )
            .unwrap();
        assert_eq!(record.get("Density min"), Some(&FieldValue::Number(2.6)));
        assert_eq!(record.get("Density max"), Some(&FieldValue::Number(2.8)));
        assert_eq!(record.get("Melting point min"), Some(&FieldValue::Null));
        assert_eq!(record.get("Melting point max"), Some(&FieldValue::Number(900.0)));

        let plain = store
            .append("Plainium", &[("density".into(), AppendValue::Number(2.7))])
            .unwrap();
        assert_eq!(plain.get("Density min"), Some(&FieldValue::Number(2.7)));
        assert_eq!(plain.get("Density max"), Some(&FieldValue::Number(2.7)));
    }

    #[test]
    fn a_range_given_to_one_bound_is_rejected() {
        let mut store = range_store();
        let err = store
            .append("Testium", &[("Density min".into(), AppendValue::Text("2-3".into()))])
            .unwrap_err();
        match err {
            HarnessError::Parse { input, reason } => {
                assert_eq!(input, "2-3");
                assert!(reason.contains("Density min"), "got: {}", reason);
            }
            other => panic!("expected Parse, got {:?}", other),
        }
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn a_bound_word_on_a_scalar_property_sets_the_scalar() {
        let mut store = store();
        let record = store
            .append("Glass", &[("density min".into(), AppendValue::Number(2.5))])
            .unwrap();
        assert_eq!(record.get("Density"), Some(&FieldValue::Number(2.5)));
    }

    #[test]
    fn null_values_leave_the_cell_empty_in_a_single_record() {
        let mut store = store();
        store
            .append(
                "Ghostium",
                &[
                    ("density".into(), AppendValue::Null),
                    ("melting point".into(), AppendValue::Number(1200.0)),
                ],
            )
            .unwrap();

        let found = store.find_by_name("Ghostium").unwrap();
        let ghosts: Vec<&Record> = found.iter().filter(|r| r.name == "Ghostium").collect();
        assert_eq!(ghosts.len(), 1, "one append makes one record");
        assert_eq!(ghosts[0].get("Density"), Some(&FieldValue::Null));
        assert_eq!(ghosts[0].get("Melting point"), Some(&FieldValue::Number(1200.0)));
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn malformed_values_abort_the_append() {
        let mut store = store();
        let err = store
            .append("Glass", &[("density".into(), AppendValue::Text("1-2".into()))])
            .unwrap_err();
        assert!(matches!(err, HarnessError::Parse { ref input, .. } if input == "1-2"));

        let err = store
            .append("Glass", &[("density".into(), AppendValue::Text("heavy".into()))])
            .unwrap_err();
        assert!(matches!(err, HarnessError::Parse { .. }));
        assert_eq!(store.len(), 4, "a failed append adds nothing");
    }

    #[test]
    fn appends_persist_to_the_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("materials.csv");
        fs::write(&path, TABLE).unwrap();

        let mut store = MaterialStore::load(&path, StoreSettings::default()).unwrap();
        store
            .append("Titanium", &[("density".into(), AppendValue::Number(4.5))])
            .unwrap();

        let reloaded = MaterialStore::load(&path, StoreSettings::default()).unwrap();
        assert_eq!(reloaded.len(), 5);
        assert_eq!(names(&reloaded.find_by_name("titanium").unwrap()), vec!["Titanium"]);
        assert_eq!(reloaded.records()[3].get("Melting point"), Some(&FieldValue::Null));

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("Titanium,4.5,,,\n"), "got: {}", text);
    }

    #[test]
    fn in_memory_stores_do_not_touch_disk() {
        let mut store = store();
        assert!(store.path().is_none());
        store.append("Glass", &[]).unwrap();
        assert!(store.save().is_ok());
    }
}
