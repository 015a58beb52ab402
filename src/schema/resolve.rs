//! Reader/writer schema resolution.
//!
//! Resolution runs once per file, after the header's writer schema is
//! parsed. For each materialized slot, the reader (table) schema is walked
//! by column-path ordinal while the writer (file) schema is walked by the
//! reader's field names. The final writer leaf is annotated with the slot;
//! reader fields missing from the writer contribute defaults to a
//! template tuple that is copied into every output row.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ResolveError;
use crate::schema::{ScalarKind, SchemaElement};
use crate::tuple::{
    self, decimal_slot_size, MemPool, PhysicalType, SlotDescriptor, TupleLayout,
};

/// Check the promotion matrix between a writer and a reader scalar kind.
///
/// A writer value may be read as its own type or a wider one; string and
/// bytes are interchangeable; decimals must agree on precision and scale.
pub fn promote(writer: &ScalarKind, reader: &ScalarKind) -> bool {
    use ScalarKind::*;
    match writer {
        Null => matches!(reader, Null),
        Boolean => matches!(reader, Boolean),
        Int => matches!(reader, Int | Long | Float | Double),
        Long => matches!(reader, Long | Float | Double),
        Float => matches!(reader, Float | Double),
        Double => matches!(reader, Double),
        String | Bytes => matches!(reader, String | Bytes),
        Decimal {
            precision, scale, ..
        } => matches!(reader, Decimal { precision: rp, scale: rs, .. }
            if rp == precision && rs == scale),
    }
}

/// Check that a reader schema leaf can feed a slot of the given physical
/// type.
pub fn slot_compatible(kind: &ScalarKind, slot: &SlotDescriptor) -> bool {
    use PhysicalType as P;
    match kind {
        // Every slot carries a null-indicator bit
        ScalarKind::Null => true,
        ScalarKind::Boolean => slot.physical_type == P::Boolean,
        ScalarKind::Int => matches!(
            slot.physical_type,
            P::Int32 | P::Int64 | P::Float | P::Double
        ),
        ScalarKind::Long => matches!(slot.physical_type, P::Int64 | P::Float | P::Double),
        ScalarKind::Float => matches!(slot.physical_type, P::Float | P::Double),
        ScalarKind::Double => slot.physical_type == P::Double,
        ScalarKind::String | ScalarKind::Bytes => slot.physical_type.is_string_family(),
        ScalarKind::Decimal { precision, .. } => {
            slot.physical_type == P::Decimal && slot.len == decimal_slot_size(*precision)
        }
    }
}

/// Verify assignability between a reader and a writer element.
///
/// Applies the nullability rule, the null-writer special case, the
/// record/record recursion gate, and the scalar promotion matrix.
fn verify_types_match(
    reader: &SchemaElement,
    writer: &SchemaElement,
    field: &str,
) -> Result<(), ResolveError> {
    if !reader.nullable() && writer.nullable() {
        return Err(ResolveError::NullabilityMismatch {
            field: field.to_string(),
        });
    }

    if writer.scalar_kind() == Some(&ScalarKind::Null) {
        if reader.scalar_kind() == Some(&ScalarKind::Null) || reader.nullable() {
            return Ok(());
        }
        return Err(mismatch(reader, writer, field));
    }

    match (reader.is_record(), writer.is_record()) {
        (true, true) => Ok(()),
        (false, false) => {
            match (reader.scalar_kind(), writer.scalar_kind()) {
                (Some(r), Some(w)) if promote(w, r) => Ok(()),
                _ => Err(mismatch(reader, writer, field)),
            }
        }
        _ => Err(mismatch(reader, writer, field)),
    }
}

fn mismatch(reader: &SchemaElement, writer: &SchemaElement, field: &str) -> ResolveError {
    ResolveError::SchemaResolutionError {
        field: field.to_string(),
        reader_type: reader.type_name().to_string(),
        writer_type: writer.type_name().to_string(),
    }
}

/// Verify that the materialized slot matches the reader schema leaf.
fn verify_slot_matches(
    slot: &SlotDescriptor,
    reader: &SchemaElement,
    field: &str,
) -> Result<(), ResolveError> {
    let compatible = match reader.scalar_kind() {
        Some(kind) => slot_compatible(kind, slot),
        // Records never map to a single slot
        None => false,
    };
    if compatible {
        Ok(())
    } else {
        Err(ResolveError::SchemaMetadataMismatch {
            field: field.to_string(),
            slot_type: slot.physical_type.name().to_string(),
            reader_type: reader.type_name().to_string(),
        })
    }
}

/// Resolve the writer schema against the reader schema for every
/// materialized slot.
///
/// On success the writer tree's leaves carry slot annotations and the
/// returned template tuple (if any) holds the defaults for reader fields
/// absent from the writer. String-valued defaults are copied into `pool`,
/// which must outlive the scan.
pub fn resolve_schemas(
    reader_root: &SchemaElement,
    writer_root: &mut SchemaElement,
    slots: &[Arc<SlotDescriptor>],
    num_partition_keys: usize,
    layout: &TupleLayout,
    pool: &mut MemPool,
) -> Result<Option<Vec<u8>>, ResolveError> {
    let mut template: Option<Vec<u8>> = None;

    for slot in slots {
        let path = &slot.col_path;
        let mut reader_rec: &SchemaElement = reader_root;
        let mut writer_rec: &mut SchemaElement = &mut *writer_root;

        for (depth, &raw_idx) in path.iter().enumerate() {
            let last = depth == path.len() - 1;
            // Partition keys exist only in the table schema, so the first
            // path index is shifted past them; deeper indices map directly.
            let reader_idx = if depth == 0 {
                raw_idx.checked_sub(num_partition_keys)
            } else {
                Some(raw_idx)
            };

            let reader_fields = match reader_rec.fields() {
                Some(fields) => fields,
                None => {
                    return Err(ResolveError::MissingField {
                        field_idx: raw_idx,
                        num_fields: 0,
                    })
                }
            };
            let reader_idx = match reader_idx {
                Some(idx) if idx < reader_fields.len() => idx,
                _ => {
                    return Err(ResolveError::MissingField {
                        field_idx: reader_idx.unwrap_or(raw_idx),
                        num_fields: reader_fields.len(),
                    })
                }
            };

            let reader_field = &reader_fields[reader_idx];
            let field_name = reader_field.name.as_str();

            let writer_idx = writer_rec.field_index(field_name);
            let Some(writer_idx) = writer_idx else {
                // Field absent from the file: fall back to the reader's
                // default value, which only works for terminal steps.
                let default = reader_field.default.as_ref().ok_or_else(|| {
                    ResolveError::MissingDefault {
                        field: field_name.to_string(),
                    }
                })?;
                if !last {
                    return Err(ResolveError::UnsupportedDefaultRecord {
                        field: field_name.to_string(),
                    });
                }
                let tuple = template.get_or_insert_with(|| vec![0u8; layout.byte_size]);
                write_default(slot, &reader_field.element, default, tuple, pool, field_name)?;
                break;
            };

            let cur = writer_rec;
            let writer_fields = match cur.fields_mut() {
                Some(fields) => fields,
                None => {
                    return Err(ResolveError::NotARecord {
                        field: field_name.to_string(),
                    })
                }
            };
            let writer_field = &mut writer_fields[writer_idx].element;

            verify_types_match(&reader_field.element, writer_field, field_name)?;

            if last {
                verify_slot_matches(slot, &reader_field.element, field_name)?;
                writer_field.slot = Some(slot.clone());
                break;
            }

            if !reader_field.element.is_record() || !writer_field.is_record() {
                return Err(ResolveError::NotARecord {
                    field: field_name.to_string(),
                });
            }
            reader_rec = &reader_field.element;
            writer_rec = writer_field;
        }
    }

    Ok(template)
}

/// Decode a reader-side default value into the template tuple.
fn write_default(
    slot: &SlotDescriptor,
    reader: &SchemaElement,
    default: &Value,
    tuple: &mut [u8],
    pool: &mut MemPool,
    field: &str,
) -> Result<(), ResolveError> {
    let slot_mismatch = || ResolveError::SchemaMetadataMismatch {
        field: field.to_string(),
        slot_type: slot.physical_type.name().to_string(),
        reader_type: reader.type_name().to_string(),
    };
    let unsupported = |kind: &str| ResolveError::UnsupportedDefault {
        field: field.to_string(),
        kind: kind.to_string(),
    };

    match (default, reader.scalar_kind()) {
        (Value::Null, _) => {
            tuple::set_null(tuple, slot);
            Ok(())
        }
        (Value::Bool(b), Some(ScalarKind::Boolean)) => {
            if slot.physical_type != PhysicalType::Boolean {
                return Err(slot_mismatch());
            }
            tuple::write_bool(tuple, slot, *b);
            Ok(())
        }
        (Value::Number(n), Some(ScalarKind::Int)) => {
            let v = n.as_i64().ok_or_else(|| unsupported("number"))?;
            if v < i32::MIN as i64 || v > i32::MAX as i64 {
                return Err(unsupported("out-of-range int"));
            }
            if !slot_compatible(&ScalarKind::Int, slot) {
                return Err(slot_mismatch());
            }
            tuple::write_int32(tuple, slot, v as i32);
            Ok(())
        }
        (Value::Number(n), Some(ScalarKind::Long)) => {
            let v = n.as_i64().ok_or_else(|| unsupported("number"))?;
            if !slot_compatible(&ScalarKind::Long, slot) {
                return Err(slot_mismatch());
            }
            tuple::write_int64(tuple, slot, v);
            Ok(())
        }
        (Value::Number(n), Some(ScalarKind::Float)) => {
            let v = n.as_f64().ok_or_else(|| unsupported("number"))?;
            if !slot_compatible(&ScalarKind::Float, slot) {
                return Err(slot_mismatch());
            }
            tuple::write_float(tuple, slot, v as f32);
            Ok(())
        }
        (Value::Number(n), Some(ScalarKind::Double)) => {
            let v = n.as_f64().ok_or_else(|| unsupported("number"))?;
            if !slot_compatible(&ScalarKind::Double, slot) {
                return Err(slot_mismatch());
            }
            tuple::write_double(tuple, slot, v);
            Ok(())
        }
        (Value::String(s), Some(ScalarKind::String | ScalarKind::Bytes)) => {
            if !slot.physical_type.is_string_family() {
                return Err(slot_mismatch());
            }
            tuple::write_string(tuple, slot, s.as_bytes(), pool);
            Ok(())
        }
        (Value::Array(_), _) => Err(unsupported("array")),
        (Value::Object(_), _) => Err(unsupported("record")),
        (other, _) => Err(unsupported(json_kind(other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "record",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema;
    use crate::tuple::{read_fixed, read_string_ref, SlotSpec};

    fn int_slot(path: Vec<usize>) -> SlotSpec {
        SlotSpec::new(path, PhysicalType::Int32)
    }

    fn resolve(
        reader_json: &str,
        writer_json: &str,
        specs: Vec<SlotSpec>,
        num_partition_keys: usize,
    ) -> Result<
        (
            SchemaElement,
            Option<Vec<u8>>,
            TupleLayout,
            Vec<Arc<SlotDescriptor>>,
            MemPool,
        ),
        ResolveError,
    > {
        let reader = parse_schema(reader_json).unwrap();
        let mut writer = parse_schema(writer_json).unwrap();
        let (layout, slots) = TupleLayout::assign(specs);
        let mut pool = MemPool::new();
        let template = resolve_schemas(
            &reader,
            &mut writer,
            &slots,
            num_partition_keys,
            &layout,
            &mut pool,
        )?;
        Ok((writer, template, layout, slots, pool))
    }

    const SIMPLE: &str =
        r#"{"type":"record","name":"r","fields":[{"name":"a","type":"int"}]}"#;

    #[test]
    fn identical_schemas_annotate_leaf() {
        let (writer, template, _, slots, _) =
            resolve(SIMPLE, SIMPLE, vec![int_slot(vec![0])], 0).unwrap();
        let leaf = &writer.fields().unwrap()[0].element;
        assert_eq!(leaf.slot.as_deref(), Some(slots[0].as_ref()));
        assert!(template.is_none());
    }

    #[test]
    fn partition_keys_shift_first_index() {
        // Column path [2] with two partition keys maps to reader field 0
        let (writer, _, _, slots, _) =
            resolve(SIMPLE, SIMPLE, vec![int_slot(vec![2])], 2).unwrap();
        let leaf = &writer.fields().unwrap()[0].element;
        assert_eq!(leaf.slot.as_deref(), Some(slots[0].as_ref()));
    }

    #[test]
    fn path_past_arity_is_missing_field() {
        let err = resolve(SIMPLE, SIMPLE, vec![int_slot(vec![5])], 0).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::MissingField {
                field_idx: 5,
                num_fields: 1
            }
        ));
    }

    #[test]
    fn promotion_int_to_double() {
        let reader = r#"{"type":"record","name":"r","fields":[{"name":"a","type":"double"}]}"#;
        let (writer, _, _, slots, _) = resolve(
            reader,
            SIMPLE,
            vec![SlotSpec::new(vec![0], PhysicalType::Double)],
            0,
        )
        .unwrap();
        let leaf = &writer.fields().unwrap()[0].element;
        assert_eq!(leaf.slot.as_deref(), Some(slots[0].as_ref()));
    }

    #[test]
    fn narrowing_rejected() {
        let reader = r#"{"type":"record","name":"r","fields":[{"name":"a","type":"int"}]}"#;
        let writer = r#"{"type":"record","name":"r","fields":[{"name":"a","type":"long"}]}"#;
        let err = resolve(reader, writer, vec![int_slot(vec![0])], 0).unwrap_err();
        assert!(matches!(err, ResolveError::SchemaResolutionError { .. }));
    }

    #[test]
    fn nullable_writer_nonnull_reader_rejected() {
        let writer =
            r#"{"type":"record","name":"r","fields":[{"name":"a","type":["null","int"]}]}"#;
        let err = resolve(SIMPLE, writer, vec![int_slot(vec![0])], 0).unwrap_err();
        assert!(matches!(err, ResolveError::NullabilityMismatch { .. }));
    }

    #[test]
    fn nonnull_writer_nullable_reader_permitted() {
        let reader =
            r#"{"type":"record","name":"r","fields":[{"name":"a","type":["null","int"]}]}"#;
        let (writer, _, _, slots, _) =
            resolve(reader, SIMPLE, vec![int_slot(vec![0])], 0).unwrap();
        let leaf = &writer.fields().unwrap()[0].element;
        assert_eq!(leaf.slot.as_deref(), Some(slots[0].as_ref()));
    }

    #[test]
    fn missing_field_with_string_default_fills_template() {
        let reader = r#"{"type":"record","name":"r","fields":[
            {"name":"a","type":"int"},
            {"name":"b","type":"string","default":"x"}]}"#;
        let (_, template, _, slots, pool) = resolve(
            reader,
            SIMPLE,
            vec![
                int_slot(vec![0]),
                SlotSpec::new(vec![1], PhysicalType::String),
            ],
            0,
        )
        .unwrap();

        let template = template.expect("defaulted field should build a template");
        let (offset, len) = read_string_ref(&template, &slots[1]);
        assert_eq!(pool.get(offset, len), b"x");
    }

    #[test]
    fn missing_field_with_int_default() {
        let reader = r#"{"type":"record","name":"r","fields":[
            {"name":"a","type":"int"},
            {"name":"n","type":"int","default":7}]}"#;
        let (_, template, _, slots, _) =
            resolve(reader, SIMPLE, vec![int_slot(vec![0]), int_slot(vec![1])], 0).unwrap();
        let template = template.unwrap();
        assert_eq!(
            i32::from_le_bytes(read_fixed::<4>(&template, slots[1].tuple_offset)),
            7
        );
    }

    #[test]
    fn missing_field_with_null_default_sets_null_bit() {
        let reader = r#"{"type":"record","name":"r","fields":[
            {"name":"a","type":"int"},
            {"name":"n","type":["null","int"],"default":null}]}"#;
        let (_, template, _, slots, _) =
            resolve(reader, SIMPLE, vec![int_slot(vec![0]), int_slot(vec![1])], 0).unwrap();
        let template = template.unwrap();
        assert!(tuple::is_null(&template, &slots[1]));
    }

    #[test]
    fn missing_field_without_default_rejected() {
        let reader = r#"{"type":"record","name":"r","fields":[
            {"name":"a","type":"int"},
            {"name":"b","type":"string"}]}"#;
        let err = resolve(
            reader,
            SIMPLE,
            vec![
                int_slot(vec![0]),
                SlotSpec::new(vec![1], PhysicalType::String),
            ],
            0,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::MissingDefault { field } if field == "b"));
    }

    #[test]
    fn nested_record_resolution() {
        let schema = r#"{"type":"record","name":"outer","fields":[
            {"name":"inner","type":{"type":"record","name":"pt","fields":[
                {"name":"x","type":"double"},
                {"name":"y","type":"double"}]}}]}"#;
        let (writer, _, _, slots, _) = resolve(
            schema,
            schema,
            vec![SlotSpec::new(vec![0, 1], PhysicalType::Double)],
            0,
        )
        .unwrap();
        let inner = &writer.fields().unwrap()[0].element;
        let y = &inner.fields().unwrap()[1].element;
        assert_eq!(y.slot.as_deref(), Some(slots[0].as_ref()));
        assert!(inner.fields().unwrap()[0].element.slot.is_none());
    }

    #[test]
    fn descending_through_scalar_rejected() {
        let reader = r#"{"type":"record","name":"r","fields":[{"name":"a","type":"int"}]}"#;
        let err = resolve(
            reader,
            reader,
            vec![SlotSpec::new(vec![0, 0], PhysicalType::Int32)],
            0,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::NotARecord { .. }));
    }

    #[test]
    fn decimal_requires_equal_precision_and_scale() {
        let reader = r#"{"type":"record","name":"r","fields":[
            {"name":"d","type":{"type":"bytes","logicalType":"decimal","precision":9,"scale":2}}]}"#;
        let writer = r#"{"type":"record","name":"r","fields":[
            {"name":"d","type":{"type":"bytes","logicalType":"decimal","precision":9,"scale":3}}]}"#;
        let err = resolve(
            reader,
            writer,
            vec![SlotSpec::with_len(vec![0], PhysicalType::Decimal, 4)],
            0,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::SchemaResolutionError { .. }));
    }

    #[test]
    fn slot_type_mismatch_is_metadata_error() {
        let err = resolve(
            SIMPLE,
            SIMPLE,
            vec![SlotSpec::new(vec![0], PhysicalType::String)],
            0,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::SchemaMetadataMismatch { .. }));
    }

    #[test]
    fn promotion_matrix_totality() {
        use ScalarKind::*;
        let kinds = [
            Null,
            Boolean,
            Int,
            Long,
            Float,
            Double,
            String,
            Bytes,
            Decimal {
                precision: 9,
                scale: 2,
                fixed_size: None,
            },
        ];
        // The permitted pairs, writer first
        let allowed: &[(&ScalarKind, &ScalarKind)] = &[
            (&kinds[0], &kinds[0]),
            (&kinds[1], &kinds[1]),
            (&kinds[2], &kinds[2]),
            (&kinds[2], &kinds[3]),
            (&kinds[2], &kinds[4]),
            (&kinds[2], &kinds[5]),
            (&kinds[3], &kinds[3]),
            (&kinds[3], &kinds[4]),
            (&kinds[3], &kinds[5]),
            (&kinds[4], &kinds[4]),
            (&kinds[4], &kinds[5]),
            (&kinds[5], &kinds[5]),
            (&kinds[6], &kinds[6]),
            (&kinds[6], &kinds[7]),
            (&kinds[7], &kinds[6]),
            (&kinds[7], &kinds[7]),
            (&kinds[8], &kinds[8]),
        ];
        for writer in &kinds {
            for reader in &kinds {
                let expected = allowed
                    .iter()
                    .any(|(w, r)| *w == writer && *r == reader);
                assert_eq!(
                    promote(writer, reader),
                    expected,
                    "promote({:?}, {:?})",
                    writer,
                    reader
                );
            }
        }
    }
}
