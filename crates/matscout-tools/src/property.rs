//! `search_by_property`: rank by target values, filter by ranges, or both.

use serde_json::{json, Map, Value};
use tracing::debug;

use matscout_contracts::{
    error::{HarnessError, HarnessResult},
    tool::{BoundArgs, ParamSpec, ParamType, ToolDescriptor},
};
use matscout_core::traits::Tool;
use matscout_store::RangeQuery;

use crate::{read_store, SharedStore};

/// Most ranked records returned by one search.
pub const MAX_RANKED: usize = 10;

pub const NO_MATCHES: &str = "No materials found matching the criteria.";

pub struct SearchByProperty {
    descriptor: ToolDescriptor,
    store: SharedStore,
}

impl SearchByProperty {
    pub const NAME: &'static str = "search_by_property";

    pub fn new(store: SharedStore) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: Self::NAME.to_string(),
                description: "Search the material database by property. Map each property name either to a target number, to rank materials by closeness, or to a {\"min\": x, \"max\": y} range (either bound optional), to keep only materials within it.".to_string(),
                inputs: vec![ParamSpec::new(
                    "properties",
                    ParamType::Object,
                    "Property names mapped to target numbers or {min, max} ranges.",
                )],
                output_type: ParamType::Any,
                terminal: false,
            },
            store,
        }
    }

    fn invalid(reason: String) -> HarnessError {
        HarnessError::InvalidArguments { tool: Self::NAME.to_string(), reason }
    }

    /// Split the request into ranking targets and range criteria.
    fn split(properties: &Map<String, Value>) -> HarnessResult<(Vec<(String, f64)>, Vec<(String, RangeQuery)>)> {
        let mut targets = Vec::new();
        let mut ranges = Vec::new();
        for (name, spec) in properties {
            match spec {
                Value::Number(n) => {
                    let target = n
                        .as_f64()
                        .ok_or_else(|| Self::invalid(format!("target for '{}' is not a finite number", name)))?;
                    targets.push((name.clone(), target));
                }
                Value::Object(bounds) => {
                    let bound = |key: &str| match bounds.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(Value::Number(n)) => Ok(n.as_f64()),
                        Some(_) => Err(Self::invalid(format!("'{}' bound for '{}' must be a number", key, name))),
                    };
                    let query = RangeQuery::new(bound("min")?, bound("max")?);
                    if query.min.is_none() && query.max.is_none() {
                        return Err(Self::invalid(format!("range for '{}' needs 'min' or 'max'", name)));
                    }
                    ranges.push((name.clone(), query));
                }
                _ => {
                    return Err(Self::invalid(format!(
                        "'{}' must map to a number or a {{min, max}} object",
                        name
                    )))
                }
            }
        }
        Ok((targets, ranges))
    }
}

impl Tool for SearchByProperty {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: &BoundArgs) -> HarnessResult<Value> {
        let empty = Map::new();
        let properties = match args.get("properties") {
            Some(Value::Object(map)) => map,
            _ => &empty,
        };
        if properties.is_empty() {
            return Err(Self::invalid("'properties' must name at least one property".to_string()));
        }

        let (targets, ranges) = Self::split(properties)?;
        let store = read_store(&self.store)?;
        let name_column = store.name_column();

        let in_range = if ranges.is_empty() {
            None
        } else {
            Some(store.filter_by_ranges(&ranges)?)
        };

        let result = if targets.is_empty() {
            let matches = in_range.unwrap_or_default();
            debug!(criteria = ranges.len(), matches = matches.len(), "range search");
            Value::Array(matches.iter().map(|r| Value::String(r.name.clone())).collect())
        } else {
            let ranked = store.find_by_properties(&targets)?;
            debug!(targets = targets.len(), ranked = ranked.len(), "ranked search");
            Value::Array(
                ranked
                    .into_iter()
                    .filter(|r| in_range.as_ref().map(|keep| keep.contains(&r.record)).unwrap_or(true))
                    .take(MAX_RANKED)
                    .map(|r| {
                        let distances: Map<String, Value> =
                            r.distances.iter().map(|(p, d)| (p.clone(), json!(d))).collect();
                        json!({
                            name_column: r.record.name,
                            "total_distance": r.total,
                            "distances": distances,
                        })
                    })
                    .collect(),
            )
        };

        match result {
            Value::Array(items) if items.is_empty() => Ok(Value::String(NO_MATCHES.to_string())),
            other => Ok(other),
        }
    }
}
