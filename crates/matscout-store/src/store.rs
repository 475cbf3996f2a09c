//! The materials table.
//!
//! The first column holds each record's display name. Columns named
//! `"<base> min"` and `"<base> max"` together form a range property called
//! `<base>`; every other column is a scalar property of the same name.
//! Property names given by callers are resolved fuzzily against this list.
//!
//! Records are only ever appended. A file-backed store is rewritten in full
//! after every append; a single writer per file is assumed.

use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use matscout_contracts::error::{HarnessError, HarnessResult};

use crate::{
    fuzzy::{extract, extract_one},
    value::{AppendValue, FieldValue, ParsedValue, RangeQuery},
};

const MIN_SUFFIX: &str = " min";
const MAX_SUFFIX: &str = " max";

// ── Settings ──────────────────────────────────────────────────────────────────

/// Fuzzy lookup thresholds, on the 0–100 similarity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// Minimum score for a record name to match a query.
    pub name_threshold: u32,
    /// Minimum score for a property name to resolve.
    pub property_threshold: u32,
    /// How many best-scoring names are considered per query.
    pub top_k: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { name_threshold: 70, property_threshold: 50, top_k: 5 }
    }
}

// ── Records and properties ────────────────────────────────────────────────────

/// One row: a display name and a value per non-name column.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    /// `(column, value)` pairs in header order.
    pub fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// The record as a JSON object, name first.
    pub fn to_json(&self, name_column: &str) -> Value {
        let mut map = Map::new();
        map.insert(name_column.to_string(), Value::String(self.name.clone()));
        for (column, value) in &self.fields {
            map.insert(column.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar { column: String },
    /// At least one of the bounds is present.
    Range { min: Option<String>, max: Option<String> },
}

/// A searchable property derived from the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
}

/// A record that matched a property search, with its distance to the
/// targets.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRecord {
    pub record: Record,
    /// Distance per resolved property, in request order.
    pub distances: Vec<(String, f64)>,
    pub total: f64,
}

fn derive_properties(columns: &[String]) -> Vec<Property> {
    let mut properties: Vec<Property> = Vec::new();
    for column in columns {
        let (base, is_min) = if let Some(base) = column.strip_suffix(MIN_SUFFIX) {
            (base, true)
        } else if let Some(base) = column.strip_suffix(MAX_SUFFIX) {
            (base, false)
        } else {
            properties.push(Property {
                name: column.clone(),
                kind: PropertyKind::Scalar { column: column.clone() },
            });
            continue;
        };

        let index = match properties
            .iter()
            .position(|p| p.name == base && matches!(p.kind, PropertyKind::Range { .. }))
        {
            Some(index) => index,
            None => {
                properties.push(Property {
                    name: base.to_string(),
                    kind: PropertyKind::Range { min: None, max: None },
                });
                properties.len() - 1
            }
        };
        if let PropertyKind::Range { min, max } = &mut properties[index].kind {
            if is_min {
                *min = Some(column.clone());
            } else {
                *max = Some(column.clone());
            }
        }
    }
    properties
}

// ── Store ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MaterialStore {
    name_column: String,
    columns: Vec<String>,
    properties: Vec<Property>,
    records: Vec<Record>,
    settings: StoreSettings,
    path: Option<PathBuf>,
}

impl MaterialStore {
    /// Build an in-memory store. `header[0]` names the name column; each row
    /// holds raw cells in header order.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Store` for an empty header or a row whose
    /// width differs from the header's.
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<String>>, settings: StoreSettings) -> HarnessResult<Self> {
        let mut header = header.into_iter();
        let name_column = header.next().ok_or_else(|| HarnessError::Store {
            reason: "table header is empty".to_string(),
        })?;
        let columns: Vec<String> = header.collect();

        let mut records = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() + 1 {
                return Err(HarnessError::Store {
                    reason: format!(
                        "row {} has {} cells, expected {}",
                        index + 1,
                        row.len(),
                        columns.len() + 1
                    ),
                });
            }
            let mut cells = row.into_iter();
            let name = cells.next().unwrap_or_default();
            let fields = columns
                .iter()
                .cloned()
                .zip(cells.map(|c| FieldValue::parse_cell(&c)))
                .collect();
            records.push(Record { name, fields });
        }

        let properties = derive_properties(&columns);
        Ok(Self { name_column, columns, properties, records, settings, path: None })
    }

    /// Read a table from CSV with a header row.
    pub fn from_reader(reader: impl Read, settings: StoreSettings) -> HarnessResult<Self> {
        let mut csv = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let header: Vec<String> = csv.headers().map_err(store_error)?.iter().map(str::to_string).collect();
        let rows = csv
            .records()
            .map(|r| r.map(|record| record.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()
            .map_err(store_error)?;
        Self::from_rows(header, rows, settings)
    }

    /// Load a file-backed store; appends are written back to `path`.
    pub fn load(path: impl AsRef<Path>, settings: StoreSettings) -> HarnessResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| HarnessError::Store {
            reason: format!("cannot open '{}': {}", path.display(), e),
        })?;
        let mut store = Self::from_reader(file, settings)?;
        store.path = Some(path.to_path_buf());
        info!(path = %path.display(), records = store.len(), "material store loaded");
        Ok(store)
    }

    /// Attach a file the store is persisted to from now on.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn name_column(&self) -> &str {
        &self.name_column
    }

    /// Non-name columns in header order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the table as CSV.
    pub fn to_writer(&self, writer: impl Write) -> HarnessResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        let header = std::iter::once(self.name_column.as_str()).chain(self.columns.iter().map(String::as_str));
        csv.write_record(header).map_err(store_error)?;
        for record in &self.records {
            let row = std::iter::once(record.name.clone()).chain(record.fields.iter().map(|(_, v)| v.to_cell()));
            csv.write_record(row).map_err(store_error)?;
        }
        csv.flush().map_err(store_error)
    }

    /// Rewrite the backing file. A store without a path has nothing to do.
    pub fn save(&self) -> HarnessResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(store_error)?;
        }
        let file = File::create(path).map_err(|e| HarnessError::Store {
            reason: format!("cannot write '{}': {}", path.display(), e),
        })?;
        self.to_writer(file)
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    /// Every record whose name is among the best fuzzy matches for `query`.
    ///
    /// The `top_k` best distinct names are kept, then those scoring below
    /// `name_threshold` are dropped. Records come back in table order.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::NotFound` when no name qualifies.
    pub fn find_by_name(&self, query: &str) -> HarnessResult<Vec<Record>> {
        let mut names: Vec<&str> = Vec::new();
        for record in &self.records {
            if !names.contains(&record.name.as_str()) {
                names.push(&record.name);
            }
        }

        let matched: Vec<&str> = extract(query, names, self.settings.top_k)
            .into_iter()
            .filter(|(_, score)| *score >= self.settings.name_threshold)
            .map(|(name, _)| name)
            .collect();
        debug!(query = %query, matches = ?matched, "name lookup");

        if matched.is_empty() {
            return Err(HarnessError::NotFound { query: query.to_string() });
        }
        Ok(self
            .records
            .iter()
            .filter(|r| matched.contains(&r.name.as_str()))
            .cloned()
            .collect())
    }

    /// Resolve a caller's property name to the closest known property.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::UnknownProperty` when the best score is below
    /// `property_threshold`.
    pub fn resolve_property(&self, name: &str) -> HarnessResult<&Property> {
        let best = extract_one(name, self.properties.iter().map(|p| p.name.as_str()));
        match best {
            Some((matched, score)) if score >= self.settings.property_threshold => {
                debug!(requested = %name, resolved = %matched, score, "property resolved");
                self.properties
                    .iter()
                    .find(|p| p.name == matched)
                    .ok_or_else(|| HarnessError::UnknownProperty { property: name.to_string() })
            }
            _ => Err(HarnessError::UnknownProperty { property: name.to_string() }),
        }
    }

    /// The record's numeric interval for a property. Scalars are a
    /// degenerate interval; a range with one bound uses it for both ends.
    fn interval(record: &Record, property: &Property) -> Option<(f64, f64)> {
        let number = |column: &Option<String>| {
            column
                .as_deref()
                .and_then(|c| record.get(c))
                .and_then(FieldValue::as_number)
        };
        match &property.kind {
            PropertyKind::Scalar { column } => record.get(column).and_then(FieldValue::as_number).map(|v| (v, v)),
            PropertyKind::Range { min, max } => match (number(min), number(max)) {
                (Some(lo), Some(hi)) => Some((lo, hi)),
                (Some(v), None) | (None, Some(v)) => Some((v, v)),
                (None, None) => None,
            },
        }
    }

    /// Rank records by their summed distance to the target values.
    ///
    /// A target inside a record's range is distance 0; outside it, the
    /// distance to the nearest bound. Records missing any requested property
    /// are left out. Equal totals keep table order.
    pub fn find_by_properties(&self, targets: &[(String, f64)]) -> HarnessResult<Vec<RankedRecord>> {
        let resolved = targets
            .iter()
            .map(|(name, target)| Ok((self.resolve_property(name)?, *target)))
            .collect::<HarnessResult<Vec<_>>>()?;

        let mut ranked: Vec<RankedRecord> = Vec::new();
        'records: for record in &self.records {
            let mut distances = Vec::with_capacity(resolved.len());
            for (property, target) in &resolved {
                let Some((low, high)) = Self::interval(record, property) else {
                    continue 'records;
                };
                let distance = if *target < low {
                    low - target
                } else if *target > high {
                    target - high
                } else {
                    0.0
                };
                distances.push((property.name.clone(), distance));
            }
            let total = distances.iter().map(|(_, d)| d).sum();
            ranked.push(RankedRecord { record: record.clone(), distances, total });
        }

        ranked.sort_by(|a, b| a.total.total_cmp(&b.total));
        Ok(ranked)
    }

    /// Records whose stored interval overlaps every requested range.
    /// Records missing a requested property are left out.
    pub fn filter_by_ranges(&self, criteria: &[(String, RangeQuery)]) -> HarnessResult<Vec<Record>> {
        let resolved = criteria
            .iter()
            .map(|(name, query)| Ok((self.resolve_property(name)?, *query)))
            .collect::<HarnessResult<Vec<_>>>()?;

        Ok(self
            .records
            .iter()
            .filter(|record| {
                resolved.iter().all(|(property, query)| {
                    Self::interval(record, property)
                        .map(|(low, high)| query.overlaps(low, high))
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect())
    }

    // ── Append ────────────────────────────────────────────────────────────────

    /// Add a record, leaving every property not supplied null.
    ///
    /// Property names that do not resolve are skipped with a warning. A
    /// number given for a range property fills both bounds, unless the name
    /// ends in a bound word (`"Density min"`, `"density maximum"`), in which
    /// case only that bound is set. Records with an existing name are added
    /// alongside, never merged.
    ///
    /// # Errors
    ///
    /// - `Parse` when a value is malformed, or a range targets a scalar or a
    ///   single bound
    /// - `Store` when the backing file cannot be rewritten
    pub fn append(&mut self, name: &str, properties: &[(String, AppendValue)]) -> HarnessResult<Record> {
        let mut fields: Vec<(String, FieldValue)> =
            self.columns.iter().map(|c| (c.clone(), FieldValue::Null)).collect();

        for (requested, value) in properties {
            let (base, bound) = split_bound(requested);
            let resolved = match self.resolve_property(base) {
                Ok(property) if matches!(property.kind, PropertyKind::Range { .. }) => Ok((property, bound)),
                _ => self.resolve_property(requested).map(|property| (property, None)),
            };
            let (property, bound) = match resolved {
                Ok((property, bound)) => (property.clone(), bound),
                Err(_) => {
                    warn!(material = %name, property = %requested, "skipping unknown property");
                    continue;
                }
            };
            let parsed = value.parse()?;

            let mut set = |column: &str, value: FieldValue| {
                if let Some(slot) = fields.iter_mut().find(|(c, _)| c == column) {
                    slot.1 = value;
                }
            };
            let single_column = match (&property.kind, bound) {
                (PropertyKind::Scalar { column }, _) => Some(column.clone()),
                (PropertyKind::Range { min, .. }, Some(Bound::Min)) => min.clone(),
                (PropertyKind::Range { max, .. }, Some(Bound::Max)) => max.clone(),
                (PropertyKind::Range { .. }, None) => None,
            };
            if bound.is_some() && single_column.is_none() {
                warn!(material = %name, property = %requested, "skipping bound missing from the table");
                continue;
            }

            match (single_column, parsed) {
                (Some(column), ParsedValue::Null) => set(&column, FieldValue::Null),
                (Some(column), ParsedValue::Number(n)) => set(&column, FieldValue::Number(n)),
                (Some(column), ParsedValue::Range(..)) => {
                    return Err(HarnessError::Parse {
                        input: match value {
                            AppendValue::Text(text) => text.clone(),
                            other => format!("{:?}", other),
                        },
                        reason: format!("'{}' holds a single value, not a range", column),
                    });
                }
                (None, parsed) => {
                    let PropertyKind::Range { min, max } = &property.kind else {
                        continue;
                    };
                    let (low, high) = match parsed {
                        ParsedValue::Null => (FieldValue::Null, FieldValue::Null),
                        ParsedValue::Number(n) => (FieldValue::Number(n), FieldValue::Number(n)),
                        ParsedValue::Range(a, b) => (FieldValue::Number(a), FieldValue::Number(b)),
                    };
                    if let Some(column) = min {
                        set(column, low);
                    }
                    if let Some(column) = max {
                        set(column, high);
                    }
                }
            }
        }

        let record = Record { name: name.to_string(), fields };
        self.records.push(record.clone());
        if let Err(e) = self.save() {
            self.records.pop();
            return Err(e);
        }
        info!(material = %name, records = self.records.len(), "material appended");
        Ok(record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Min,
    Max,
}

/// Split a trailing bound word off a property name: `"Density min"` becomes
/// `("Density", Some(Bound::Min))`.
fn split_bound(name: &str) -> (&str, Option<Bound>) {
    let trimmed = name.trim_end();
    let Some((base, last)) = trimmed.rsplit_once(char::is_whitespace) else {
        return (name, None);
    };
    let bound = match last.to_lowercase().as_str() {
        "min" | "minimum" | "lower" => Bound::Min,
        "max" | "maximum" | "upper" => Bound::Max,
        _ => return (name, None),
    };
    let base = base.trim_end();
    if base.is_empty() {
        return (name, None);
    }
    (base, Some(bound))
}

fn store_error(e: impl std::fmt::Display) -> HarnessError {
    HarnessError::Store { reason: e.to_string() }
}
