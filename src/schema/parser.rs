//! JSON schema parser.
//!
//! Parses Avro schema JSON into [`SchemaElement`] trees. The parser
//! accepts the subset of Avro the scanner materializes: primitives,
//! records, two-branch nullable unions, and the decimal logical type on
//! `bytes`/`fixed`. Everything else is rejected up front so the decode
//! paths never meet a type they cannot handle.

use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::schema::{ElementKind, ScalarKind, SchemaElement, SchemaField};

/// Parse an Avro schema from JSON text.
pub fn parse_schema(json: &str) -> Result<SchemaElement, SchemaError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| SchemaError::ParseError(format!("Invalid JSON: {}", e)))?;
    parse_element(&value)
}

/// Parse an Avro schema from raw JSON bytes (header metadata value).
pub fn parse_schema_bytes(json: &[u8]) -> Result<SchemaElement, SchemaError> {
    let text = std::str::from_utf8(json)
        .map_err(|e| SchemaError::ParseError(format!("Schema is not valid UTF-8: {}", e)))?;
    parse_schema(text)
}

fn parse_element(value: &Value) -> Result<SchemaElement, SchemaError> {
    match value {
        Value::String(s) => Ok(SchemaElement::scalar(parse_primitive(s)?)),
        Value::Object(obj) => parse_object(obj),
        Value::Array(branches) => parse_union(branches),
        other => Err(SchemaError::InvalidSchema(format!(
            "Expected string, object, or array, found: {}",
            other
        ))),
    }
}

fn parse_primitive(name: &str) -> Result<ScalarKind, SchemaError> {
    match name {
        "null" => Ok(ScalarKind::Null),
        "boolean" => Ok(ScalarKind::Boolean),
        "int" => Ok(ScalarKind::Int),
        "long" => Ok(ScalarKind::Long),
        "float" => Ok(ScalarKind::Float),
        "double" => Ok(ScalarKind::Double),
        "bytes" => Ok(ScalarKind::Bytes),
        "string" => Ok(ScalarKind::String),
        other => Err(SchemaError::UnsupportedType(other.to_string())),
    }
}

fn parse_object(obj: &Map<String, Value>) -> Result<SchemaElement, SchemaError> {
    let type_str = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SchemaError::InvalidSchema("Missing 'type' field".to_string()))?;

    if obj.get("logicalType").and_then(|v| v.as_str()) == Some("decimal") {
        return parse_decimal(obj, type_str);
    }

    match type_str {
        "record" => parse_record(obj),
        // Primitives may appear in object form; non-decimal logical type
        // annotations decode as their base type
        primitive => Ok(SchemaElement::scalar(parse_primitive(primitive)?)),
    }
}

fn parse_decimal(obj: &Map<String, Value>, base: &str) -> Result<SchemaElement, SchemaError> {
    let precision = obj
        .get("precision")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| SchemaError::InvalidSchema("Decimal missing 'precision'".to_string()))?;
    let scale = obj.get("scale").and_then(|v| v.as_u64()).unwrap_or(0);

    if precision == 0 || precision > 38 {
        return Err(SchemaError::InvalidSchema(format!(
            "Decimal precision {} out of range [1, 38]",
            precision
        )));
    }
    if scale > precision {
        return Err(SchemaError::InvalidSchema(format!(
            "Decimal scale {} exceeds precision {}",
            scale, precision
        )));
    }

    let fixed_size = match base {
        "bytes" => None,
        "fixed" => {
            let size = obj
                .get("size")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| SchemaError::InvalidSchema("Fixed missing 'size'".to_string()))?;
            Some(size as usize)
        }
        other => {
            return Err(SchemaError::UnsupportedType(format!(
                "decimal backed by {}",
                other
            )))
        }
    };

    Ok(SchemaElement::scalar(ScalarKind::Decimal {
        precision: precision as u32,
        scale: scale as u32,
        fixed_size,
    }))
}

fn parse_record(obj: &Map<String, Value>) -> Result<SchemaElement, SchemaError> {
    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SchemaError::InvalidSchema("Record missing 'name' field".to_string()))?;

    let raw_fields = obj
        .get("fields")
        .and_then(|v| v.as_array())
        .ok_or_else(|| SchemaError::InvalidSchema("Record missing 'fields' array".to_string()))?;

    let mut fields = Vec::with_capacity(raw_fields.len());
    for raw in raw_fields {
        let field_obj = raw.as_object().ok_or_else(|| {
            SchemaError::InvalidSchema("Record field is not an object".to_string())
        })?;
        let field_name = field_obj
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchemaError::InvalidSchema("Field missing 'name'".to_string()))?;
        let field_type = field_obj
            .get("type")
            .ok_or_else(|| SchemaError::InvalidSchema(format!("Field '{}' missing 'type'", field_name)))?;

        let element = parse_element(field_type)?;
        fields.push(SchemaField {
            name: field_name.to_string(),
            default: field_obj.get("default").cloned(),
            element,
        });
    }

    Ok(SchemaElement::record(name, fields))
}

/// Flatten a union into its non-null branch.
///
/// Only two-branch unions with exactly one `null` are representable as
/// materialized columns; the surviving branch carries the null branch
/// index so decoding can interpret the wire-level union tag.
fn parse_union(branches: &[Value]) -> Result<SchemaElement, SchemaError> {
    if branches.len() != 2 {
        return Err(SchemaError::UnsupportedType(format!(
            "union with {} branches (only [null, T] is supported)",
            branches.len()
        )));
    }

    let null_position = branches
        .iter()
        .position(|b| b.as_str() == Some("null"))
        .ok_or_else(|| {
            SchemaError::UnsupportedType(
                "union without a null branch (only [null, T] is supported)".to_string(),
            )
        })?;

    let inner = &branches[1 - null_position];
    if inner.as_str() == Some("null") {
        return Err(SchemaError::UnsupportedType(
            "union of two null branches".to_string(),
        ));
    }

    let element = parse_element(inner)?;
    if element.nullable() {
        return Err(SchemaError::UnsupportedType(
            "nested union".to_string(),
        ));
    }

    Ok(element.with_null_position(null_position as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives() {
        for (json, kind) in [
            (r#""null""#, ScalarKind::Null),
            (r#""boolean""#, ScalarKind::Boolean),
            (r#""int""#, ScalarKind::Int),
            (r#""long""#, ScalarKind::Long),
            (r#""float""#, ScalarKind::Float),
            (r#""double""#, ScalarKind::Double),
            (r#""bytes""#, ScalarKind::Bytes),
            (r#""string""#, ScalarKind::String),
        ] {
            let element = parse_schema(json).unwrap();
            assert_eq!(element.scalar_kind(), Some(&kind), "for {}", json);
        }
    }

    #[test]
    fn record_with_fields_and_default() {
        let schema = parse_schema(
            r#"{"type":"record","name":"row",
                "fields":[
                    {"name":"id","type":"long"},
                    {"name":"tag","type":"string","default":"none"}
                ]}"#,
        )
        .unwrap();

        let fields = schema.fields().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "id");
        assert!(fields[0].default.is_none());
        assert_eq!(fields[1].default, Some(serde_json::json!("none")));
    }

    #[test]
    fn nullable_union_both_orders() {
        let first = parse_schema(r#"["null","int"]"#).unwrap();
        assert_eq!(first.null_union_position, Some(0));
        assert_eq!(first.scalar_kind(), Some(&ScalarKind::Int));

        let second = parse_schema(r#"["int","null"]"#).unwrap();
        assert_eq!(second.null_union_position, Some(1));
    }

    #[test]
    fn nullable_record_field() {
        let schema = parse_schema(
            r#"{"type":"record","name":"row",
                "fields":[{"name":"v","type":["null","double"]}]}"#,
        )
        .unwrap();
        let field = &schema.fields().unwrap()[0];
        assert!(field.element.nullable());
        assert_eq!(field.element.scalar_kind(), Some(&ScalarKind::Double));
    }

    #[test]
    fn decimal_on_bytes() {
        let schema =
            parse_schema(r#"{"type":"bytes","logicalType":"decimal","precision":12,"scale":4}"#)
                .unwrap();
        assert_eq!(
            schema.scalar_kind(),
            Some(&ScalarKind::Decimal {
                precision: 12,
                scale: 4,
                fixed_size: None
            })
        );
    }

    #[test]
    fn decimal_on_fixed() {
        let schema = parse_schema(
            r#"{"type":"fixed","name":"d","size":6,
                "logicalType":"decimal","precision":12,"scale":2}"#,
        )
        .unwrap();
        assert_eq!(
            schema.scalar_kind(),
            Some(&ScalarKind::Decimal {
                precision: 12,
                scale: 2,
                fixed_size: Some(6)
            })
        );
    }

    #[test]
    fn non_decimal_logical_type_decodes_as_base() {
        let schema =
            parse_schema(r#"{"type":"long","logicalType":"timestamp-millis"}"#).unwrap();
        assert_eq!(schema.scalar_kind(), Some(&ScalarKind::Long));
    }

    #[test]
    fn nested_record() {
        let schema = parse_schema(
            r#"{"type":"record","name":"outer","fields":[
                {"name":"inner","type":
                    {"type":"record","name":"pt","fields":[
                        {"name":"x","type":"double"},
                        {"name":"y","type":"double"}]}}]}"#,
        )
        .unwrap();
        let inner = &schema.fields().unwrap()[0].element;
        assert!(inner.is_record());
        assert_eq!(inner.fields().unwrap().len(), 2);
    }

    #[test]
    fn rejects_unsupported_types() {
        for json in [
            r#"{"type":"array","items":"int"}"#,
            r#"{"type":"map","values":"int"}"#,
            r#"{"type":"enum","name":"e","symbols":["A"]}"#,
            r#"{"type":"fixed","name":"f","size":4}"#,
            r#"["int","string"]"#,
            r#"["null","int","string"]"#,
            r#"["null","null"]"#,
            r#""unknown_type""#,
        ] {
            let err = parse_schema(json).unwrap_err();
            assert!(
                matches!(err, SchemaError::UnsupportedType(_) | SchemaError::InvalidSchema(_)),
                "expected rejection for {}",
                json
            );
        }
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            parse_schema(r#"{"type": "record""#),
            Err(SchemaError::ParseError(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_decimal() {
        let err = parse_schema(
            r#"{"type":"bytes","logicalType":"decimal","precision":40,"scale":2}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSchema(_)));
    }
}
