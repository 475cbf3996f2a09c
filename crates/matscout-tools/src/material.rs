//! `search_by_material` and `add_material`: name lookup and append.

use serde_json::Value;
use tracing::debug;

use matscout_contracts::{
    error::{HarnessError, HarnessResult},
    tool::{BoundArgs, ParamSpec, ParamType, ToolDescriptor},
};
use matscout_core::traits::Tool;
use matscout_store::AppendValue;

use crate::{read_store, write_store, SharedStore};

// ── search_by_material ────────────────────────────────────────────────────────

pub struct SearchByMaterial {
    descriptor: ToolDescriptor,
    store: SharedStore,
}

impl SearchByMaterial {
    pub const NAME: &'static str = "search_by_material";

    pub fn new(store: SharedStore) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: Self::NAME.to_string(),
                description: "Search the material database for a material by name and return every close match with its properties.".to_string(),
                inputs: vec![ParamSpec::new("material", ParamType::String, "The material to search for.")],
                output_type: ParamType::Array,
                terminal: false,
            },
            store,
        }
    }
}

impl Tool for SearchByMaterial {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: &BoundArgs) -> HarnessResult<Value> {
        let material = args.str("material").unwrap_or_default();
        let store = read_store(&self.store)?;
        let records = store.find_by_name(material)?;
        debug!(material = %material, matches = records.len(), "material search");
        Ok(Value::Array(
            records.iter().map(|r| r.to_json(store.name_column())).collect(),
        ))
    }
}

// ── add_material ──────────────────────────────────────────────────────────────

pub struct AddMaterial {
    descriptor: ToolDescriptor,
    store: SharedStore,
}

impl AddMaterial {
    pub const NAME: &'static str = "add_material";

    pub fn new(store: SharedStore) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: Self::NAME.to_string(),
                description: "Add a material and its known properties to the material database. Each property value is a number, a 'min-max' range string, or None.".to_string(),
                inputs: vec![
                    ParamSpec::new("material", ParamType::String, "The name of the material to add."),
                    ParamSpec::new(
                        "properties",
                        ParamType::Object,
                        "Property names mapped to values, e.g. {\"Density\": \"2.6-2.8\"}.",
                    )
                    .nullable(),
                ],
                output_type: ParamType::String,
                terminal: false,
            },
            store,
        }
    }
}

impl Tool for AddMaterial {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: &BoundArgs) -> HarnessResult<Value> {
        let material = args.str("material").unwrap_or_default().trim();
        if material.is_empty() {
            return Err(HarnessError::InvalidArguments {
                tool: Self::NAME.to_string(),
                reason: "'material' must not be empty".to_string(),
            });
        }

        let mut properties = Vec::new();
        if let Some(Value::Object(map)) = args.get("properties") {
            for (name, value) in map {
                let value = AppendValue::from_json(value).ok_or_else(|| HarnessError::InvalidArguments {
                    tool: Self::NAME.to_string(),
                    reason: format!("value for '{}' must be a number, a string, or None", name),
                })?;
                properties.push((name.clone(), value));
            }
        }

        let mut store = write_store(&self.store)?;
        store.append(material, &properties)?;
        Ok(Value::String(format!("Material '{}' added to the database.", material)))
    }
}
