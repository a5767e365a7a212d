// ── JSON-to-value parsing ──
//
// The typed direction used by write and exec: a JSON value arriving on
// the wire is parsed against the declared type from bean metadata.
// Scalars also accept their string form, since GET requests can only
// transport strings.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use spyglass_bus::{BusType, BusValue, CompositeSchema, CompositeValue, TableValue};

use crate::error::ProtocolError;

/// Parse `json` into a `BusValue` of the declared type.
pub fn deserialize_value(ty: &BusType, json: &JsonValue) -> Result<BusValue, ProtocolError> {
    match ty {
        BusType::Any => Ok(structural(json)),
        _ if json.is_null() => Ok(BusValue::Null),
        BusType::Bool => match json {
            JsonValue::Bool(b) => Ok(BusValue::Bool(*b)),
            JsonValue::String(s) => match s.as_str() {
                "true" => Ok(BusValue::Bool(true)),
                "false" => Ok(BusValue::Bool(false)),
                _ => Err(mismatch(ty, json)),
            },
            _ => Err(mismatch(ty, json)),
        },
        BusType::Int => match json {
            JsonValue::Number(n) => n
                .as_i64()
                .map(BusValue::Int)
                .ok_or_else(|| mismatch(ty, json)),
            JsonValue::String(s) => s
                .parse()
                .map(BusValue::Int)
                .map_err(|_| mismatch(ty, json)),
            _ => Err(mismatch(ty, json)),
        },
        BusType::Float => match json {
            JsonValue::Number(n) => n
                .as_f64()
                .map(BusValue::Float)
                .ok_or_else(|| mismatch(ty, json)),
            JsonValue::String(s) => s
                .parse()
                .map(BusValue::Float)
                .map_err(|_| mismatch(ty, json)),
            _ => Err(mismatch(ty, json)),
        },
        BusType::Text => match json {
            JsonValue::String(s) => Ok(BusValue::Text(s.clone())),
            JsonValue::Bool(b) => Ok(BusValue::Text(b.to_string())),
            JsonValue::Number(n) => Ok(BusValue::Text(n.to_string())),
            _ => Err(mismatch(ty, json)),
        },
        BusType::Seq(inner) => match json {
            JsonValue::Array(items) => {
                let converted = items
                    .iter()
                    .map(|item| deserialize_value(inner, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(BusValue::seq(converted))
            }
            _ => Err(mismatch(ty, json)),
        },
        BusType::Map(inner) => match json {
            JsonValue::Object(entries) => {
                let mut converted = IndexMap::new();
                for (key, item) in entries {
                    converted.insert(key.clone(), deserialize_value(inner, item)?);
                }
                Ok(BusValue::map(converted))
            }
            _ => Err(mismatch(ty, json)),
        },
        BusType::Composite(schema) => Ok(BusValue::Composite(Arc::new(composite(schema, json)?))),
        BusType::Table { index, row } => match json {
            JsonValue::Array(items) => {
                let rows = items
                    .iter()
                    .map(|item| composite(row, item).map(Arc::new))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(BusValue::Table(Arc::new(TableValue {
                    type_name: row.type_name.clone(),
                    index: index.clone(),
                    rows,
                })))
            }
            _ => Err(mismatch(ty, json)),
        },
    }
}

/// Parse a composite: the object literal must carry exactly the
/// declared fields.
fn composite(schema: &CompositeSchema, json: &JsonValue) -> Result<CompositeValue, ProtocolError> {
    let obj = json.as_object().ok_or_else(|| {
        ProtocolError::InvalidRequest(format!(
            "composite {} needs an object literal, got {json}",
            schema.type_name
        ))
    })?;

    for key in obj.keys() {
        if !schema.fields.iter().any(|(name, _)| name == key) {
            return Err(ProtocolError::InvalidRequest(format!(
                "composite {} has no field '{key}'",
                schema.type_name
            )));
        }
    }

    let mut fields = IndexMap::new();
    for (name, field_ty) in &schema.fields {
        let raw = obj.get(name).ok_or_else(|| {
            ProtocolError::InvalidRequest(format!(
                "composite {} is missing field '{name}'",
                schema.type_name
            ))
        })?;
        fields.insert(name.clone(), deserialize_value(field_ty, raw)?);
    }
    Ok(CompositeValue {
        type_name: schema.type_name.clone(),
        fields,
    })
}

/// Structural mapping for `BusType::Any`.
fn structural(json: &JsonValue) -> BusValue {
    match json {
        JsonValue::Null => BusValue::Null,
        JsonValue::Bool(b) => BusValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                BusValue::Int(i)
            } else {
                BusValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => BusValue::Text(s.clone()),
        JsonValue::Array(items) => BusValue::seq(items.iter().map(structural).collect()),
        JsonValue::Object(entries) => {
            let mut map = IndexMap::new();
            for (key, item) in entries {
                map.insert(key.clone(), structural(item));
            }
            BusValue::map(map)
        }
    }
}

fn mismatch(ty: &BusType, json: &JsonValue) -> ProtocolError {
    ProtocolError::InvalidRequest(format!("cannot convert {json} to {ty}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{serialize_value, SerializeLimits};
    use crate::request::ValueFaultPolicy;
    use serde_json::json;

    fn schema() -> CompositeSchema {
        CompositeSchema {
            type_name: "MemoryUsage".to_owned(),
            fields: vec![
                ("used".to_owned(), BusType::Int),
                ("max".to_owned(), BusType::Int),
            ],
        }
    }

    #[test]
    fn scalars_parse_from_native_and_string_form() {
        assert_eq!(
            deserialize_value(&BusType::Int, &json!(42)).unwrap(),
            BusValue::Int(42)
        );
        assert_eq!(
            deserialize_value(&BusType::Int, &json!("42")).unwrap(),
            BusValue::Int(42)
        );
        assert_eq!(
            deserialize_value(&BusType::Bool, &json!("true")).unwrap(),
            BusValue::Bool(true)
        );
        assert!(deserialize_value(&BusType::Int, &json!("forty-two")).is_err());
    }

    #[test]
    fn null_maps_to_null_for_any_declared_type() {
        assert_eq!(
            deserialize_value(&BusType::Int, &JsonValue::Null).unwrap(),
            BusValue::Null
        );
    }

    #[test]
    fn seq_and_map_build_declared_shapes() {
        let value = deserialize_value(
            &BusType::Seq(Box::new(BusType::Int)),
            &json!([1, 2, 3]),
        )
        .unwrap();
        assert_eq!(
            value,
            BusValue::seq(vec![BusValue::Int(1), BusValue::Int(2), BusValue::Int(3)])
        );

        assert!(deserialize_value(
            &BusType::Seq(Box::new(BusType::Int)),
            &json!([1, "two", 3])
        )
        .is_err());
    }

    #[test]
    fn composite_requires_exact_fields() {
        let ok = deserialize_value(&BusType::Composite(schema()), &json!({"used": 1, "max": 2}));
        assert!(ok.is_ok());

        let missing =
            deserialize_value(&BusType::Composite(schema()), &json!({"used": 1})).unwrap_err();
        assert_eq!(missing.status(), 400);

        let extra = deserialize_value(
            &BusType::Composite(schema()),
            &json!({"used": 1, "max": 2, "weird": 3}),
        )
        .unwrap_err();
        assert_eq!(extra.status(), 400);
    }

    #[test]
    fn structural_roundtrip_within_limits() {
        // Property 3: toJSON(fromJSON(v)) == v for values within limits.
        let values = [
            json!(null),
            json!(true),
            json!(17),
            json!(2.5),
            json!("text"),
            json!([1, "two", [3]]),
            json!({"a": 1, "b": {"c": [true, null]}}),
        ];
        for v in values {
            let parsed = deserialize_value(&BusType::Any, &v).unwrap();
            let back = serialize_value(
                &parsed,
                &[],
                &SerializeLimits::default(),
                &ValueFaultPolicy::Strict,
            )
            .unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn table_roundtrip() {
        let ty = BusType::Table {
            index: vec!["used".to_owned()],
            row: schema(),
        };
        let value = deserialize_value(&ty, &json!([{"used": 1, "max": 2}])).unwrap();
        match &value {
            BusValue::Table(t) => assert_eq!(t.rows.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
