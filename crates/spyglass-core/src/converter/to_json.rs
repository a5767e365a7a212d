// ── Value-to-JSON serialization ──
//
// Serialization proceeds in two phases. First the inner path is walked
// to locate the addressed sub-value: integer index into a sequence,
// key into a map, field into a composite, one segment per index column
// into a table, property into an open bean. Then the located value is
// fully expanded, subject to the limits. A revisited compound node
// along the current descent renders as its string form instead of
// recursing; open-bean graphs are the one shape that can actually
// cycle.

use serde_json::{json, Map as JsonMap, Value as JsonValue};

use spyglass_bus::{BusValue, CompositeValue, TableValue};

use crate::error::ProtocolError;
use crate::request::ValueFaultPolicy;

/// Bounds applied while expanding a value.
#[derive(Debug, Clone, Default)]
pub struct SerializeLimits {
    /// Remaining nesting depth; `Some(0)` renders everything as its
    /// string form, `None` is unlimited.
    pub max_depth: Option<usize>,
    /// Elements serialized per sequence/map/table before truncation.
    pub max_collection_size: Option<usize>,
    /// Global node budget for the whole conversion.
    pub max_objects: Option<usize>,
}

/// Serialize `value`, descending along `path` first.
pub fn serialize_value(
    value: &BusValue,
    path: &[String],
    limits: &SerializeLimits,
    fault: &ValueFaultPolicy,
) -> Result<JsonValue, ProtocolError> {
    let located = match locate(value.clone(), path) {
        Ok(v) => v,
        Err(missing) => {
            return match fault {
                ValueFaultPolicy::Strict => Err(ProtocolError::path_not_found(missing)),
                ValueFaultPolicy::Ignore => Ok(JsonValue::Null),
                ValueFaultPolicy::Custom(f) => {
                    Ok(f(&ProtocolError::path_not_found(missing)))
                }
            };
        }
    };

    let mut expander = Expander {
        limits,
        visited: Vec::new(),
        objects_used: 0,
    };
    Ok(expander.expand(&located, limits.max_depth))
}

// ── Phase 1: path descent ───────────────────────────────────────────

/// Walk the path; `Err` carries the human-readable "what was missing".
fn locate(mut value: BusValue, path: &[String]) -> Result<BusValue, String> {
    let mut remaining = path;
    while let Some(segment) = remaining.first() {
        let (next, consumed) = step(&value, segment, remaining)?;
        value = next;
        remaining = &remaining[consumed..];
    }
    Ok(value)
}

/// One descent step. Returns the sub-value and how many path segments
/// it consumed (tables consume one per index column).
fn step(
    value: &BusValue,
    segment: &str,
    remaining: &[String],
) -> Result<(BusValue, usize), String> {
    match value {
        BusValue::Seq(items) => {
            let index: usize = segment
                .parse()
                .map_err(|_| format!("'{segment}' is not a sequence index"))?;
            items
                .get(index)
                .cloned()
                .map(|v| (v, 1))
                .ok_or_else(|| format!("index {index} out of bounds (len {})", items.len()))
        }
        BusValue::Map(entries) => entries
            .get(segment)
            .cloned()
            .map(|v| (v, 1))
            .ok_or_else(|| format!("no key '{segment}' in map")),
        BusValue::Composite(composite) => composite
            .fields
            .get(segment)
            .cloned()
            .map(|v| (v, 1))
            .ok_or_else(|| format!("no field '{segment}' in {}", composite.type_name)),
        BusValue::Table(table) => {
            let columns = table.index.len();
            if remaining.len() < columns {
                return Err(format!(
                    "table {} needs {columns} index segment(s)",
                    table.type_name
                ));
            }
            let key: Vec<&str> = remaining[..columns].iter().map(String::as_str).collect();
            table
                .row(&key)
                .map(|row| (BusValue::Composite(row.clone()), columns))
                .ok_or_else(|| format!("no row {key:?} in table {}", table.type_name))
        }
        BusValue::Bean(bean) => bean
            .get(segment)
            .map(|v| (v, 1))
            .ok_or_else(|| format!("no property '{segment}' on {}", bean.type_name())),
        other => Err(format!(
            "cannot descend into {} value with remaining path '{segment}'",
            other.shape()
        )),
    }
}

// ── Phase 2: expansion ──────────────────────────────────────────────

struct Expander<'a> {
    limits: &'a SerializeLimits,
    /// Identities of compound nodes on the current descent.
    visited: Vec<usize>,
    objects_used: usize,
}

impl Expander<'_> {
    fn expand(&mut self, value: &BusValue, depth: Option<usize>) -> JsonValue {
        if self.budget_exhausted() {
            return json!(value.string_form());
        }
        self.objects_used += 1;

        match value {
            BusValue::Null => JsonValue::Null,
            BusValue::Bool(b) => json!(b),
            BusValue::Int(i) => json!(i),
            BusValue::Float(f) => json!(f),
            BusValue::Text(s) => json!(s),
            BusValue::Opaque(_) => json!(value.string_form()),
            compound => {
                if depth == Some(0) {
                    return json!(compound.string_form());
                }
                let identity = compound.identity().unwrap_or_default();
                if self.visited.contains(&identity) {
                    return json!(compound.string_form());
                }
                self.visited.push(identity);
                let next_depth = depth.map(|d| d - 1);
                let result = match compound {
                    BusValue::Seq(items) => self.expand_seq(items, next_depth),
                    BusValue::Map(entries) => {
                        let mut obj = JsonMap::new();
                        for (i, (key, item)) in entries.iter().enumerate() {
                            if self.over_collection_limit(i) {
                                obj.insert(
                                    "...".to_owned(),
                                    json!(format!("{} more entries omitted", entries.len() - i)),
                                );
                                break;
                            }
                            obj.insert(key.clone(), self.expand(item, next_depth));
                        }
                        JsonValue::Object(obj)
                    }
                    BusValue::Composite(composite) => self.expand_composite(composite, next_depth),
                    BusValue::Table(table) => self.expand_table(table, next_depth),
                    BusValue::Bean(bean) => {
                        let mut obj = JsonMap::new();
                        for key in bean.keys() {
                            if let Some(item) = bean.get(&key) {
                                obj.insert(key, self.expand(&item, next_depth));
                            }
                        }
                        JsonValue::Object(obj)
                    }
                    // Scalars handled above.
                    _ => json!(compound.string_form()),
                };
                self.visited.pop();
                result
            }
        }
    }

    fn expand_seq(&mut self, items: &[BusValue], depth: Option<usize>) -> JsonValue {
        let mut out = Vec::new();
        for (i, item) in items.iter().enumerate() {
            if self.over_collection_limit(i) {
                out.push(json!(format!("{} more elements omitted", items.len() - i)));
                break;
            }
            out.push(self.expand(item, depth));
        }
        JsonValue::Array(out)
    }

    fn expand_composite(&mut self, composite: &CompositeValue, depth: Option<usize>) -> JsonValue {
        let mut obj = JsonMap::new();
        for (key, item) in &composite.fields {
            obj.insert(key.clone(), self.expand(item, depth));
        }
        JsonValue::Object(obj)
    }

    /// Tables render as nested objects keyed by their index columns.
    fn expand_table(&mut self, table: &TableValue, depth: Option<usize>) -> JsonValue {
        let mut root = JsonMap::new();
        for (i, row) in table.rows.iter().enumerate() {
            if self.over_collection_limit(i) {
                root.insert(
                    "...".to_owned(),
                    json!(format!("{} more rows omitted", table.rows.len() - i)),
                );
                break;
            }
            let mut cursor = &mut root;
            let mut key_parts = Vec::new();
            for column in &table.index {
                key_parts.push(
                    row.fields
                        .get(column)
                        .map(BusValue::string_form)
                        .unwrap_or_default(),
                );
            }
            // All but the last index column open nested objects.
            for part in &key_parts[..key_parts.len().saturating_sub(1)] {
                cursor = cursor
                    .entry(part.clone())
                    .or_insert_with(|| JsonValue::Object(JsonMap::new()))
                    .as_object_mut()
                    .expect("freshly inserted object");
            }
            if let Some(last) = key_parts.last() {
                let rendered = self.expand_composite(row, depth);
                cursor.insert(last.clone(), rendered);
            }
        }
        JsonValue::Object(root)
    }

    fn budget_exhausted(&self) -> bool {
        self.limits
            .max_objects
            .is_some_and(|max| self.objects_used >= max)
    }

    fn over_collection_limit(&self, emitted: usize) -> bool {
        self.limits
            .max_collection_size
            .is_some_and(|max| emitted >= max)
    }
}
