//! Interpreted record materializer.
//!
//! Walks the resolved writer schema over a block's decoded bytes,
//! dispatching on each leaf's type and writing annotated leaves into the
//! output tuple with promotion applied at the slot write. Unannotated
//! leaves are decoded and discarded so the cursor stays in step.

use crate::error::DecodeError;
use crate::schema::{ElementKind, ScalarKind, SchemaElement};
use crate::tuple::{self, MemPool, SlotDescriptor};

use super::varint::decode_zigzag;

/// Read the branch index of a two-branch nullable union.
///
/// Returns true when the branch equals the null position. Any index
/// outside {0, 1} is corrupt data.
#[inline]
pub(crate) fn read_union_branch(
    null_position: u8,
    data: &mut &[u8],
) -> Result<bool, DecodeError> {
    let branch = decode_zigzag(data)?;
    match branch {
        0 | 1 => Ok(branch == null_position as i64),
        other => Err(DecodeError::InvalidValue(format!(
            "union branch index {} out of range",
            other
        ))),
    }
}

/// Decode one record into `tuple`, consuming its bytes from `data`.
///
/// `element` must be a record node of the resolved writer schema and
/// `tuple` must start as a copy of the template tuple (or zeroed).
pub fn materialize_record(
    element: &SchemaElement,
    pool: &mut MemPool,
    data: &mut &[u8],
    tuple: &mut [u8],
) -> Result<(), DecodeError> {
    let fields = element.fields().unwrap_or(&[]);
    for field in fields {
        let el = &field.element;
        let slot = el.slot.as_deref();

        if let Some(position) = el.null_union_position {
            if read_union_branch(position, data)? {
                // Null field: no payload bytes follow
                if let Some(slot) = slot {
                    tuple::set_null(tuple, slot);
                }
                continue;
            }
        }

        match &el.kind {
            ElementKind::Record { .. } => materialize_record(el, pool, data, tuple)?,
            ElementKind::Scalar(kind) => read_scalar(kind, slot, pool, data, tuple)?,
        }
    }
    Ok(())
}

/// Decode one scalar datum, writing it into `tuple` when a slot is bound.
pub(crate) fn read_scalar(
    kind: &ScalarKind,
    slot: Option<&SlotDescriptor>,
    pool: &mut MemPool,
    data: &mut &[u8],
    tuple: &mut [u8],
) -> Result<(), DecodeError> {
    match kind {
        ScalarKind::Null => {
            if let Some(slot) = slot {
                tuple::set_null(tuple, slot);
            }
        }
        ScalarKind::Boolean => {
            let value = read_boolean(data)?;
            if let Some(slot) = slot {
                tuple::write_bool(tuple, slot, value);
            }
        }
        ScalarKind::Int => {
            let value = decode_zigzag(data)?;
            if value < i32::MIN as i64 || value > i32::MAX as i64 {
                return Err(DecodeError::ValueOverflow {
                    value,
                    limit: "int".to_string(),
                });
            }
            if let Some(slot) = slot {
                tuple::write_int32(tuple, slot, value as i32);
            }
        }
        ScalarKind::Long => {
            let value = decode_zigzag(data)?;
            if let Some(slot) = slot {
                tuple::write_int64(tuple, slot, value);
            }
        }
        ScalarKind::Float => {
            let raw = read_exact(data, 4)?;
            if let Some(slot) = slot {
                let value = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                tuple::write_float(tuple, slot, value);
            }
        }
        ScalarKind::Double => {
            let raw = read_exact(data, 8)?;
            if let Some(slot) = slot {
                let value = f64::from_le_bytes([
                    raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
                ]);
                tuple::write_double(tuple, slot, value);
            }
        }
        ScalarKind::String | ScalarKind::Bytes => {
            let bytes = read_len_prefixed(data)?;
            if let Some(slot) = slot {
                tuple::write_string(tuple, slot, bytes, pool);
            }
        }
        ScalarKind::Decimal { fixed_size, .. } => {
            let raw = match fixed_size {
                Some(size) => read_exact(data, *size)?,
                None => read_len_prefixed(data)?,
            };
            if let Some(slot) = slot {
                if raw.len() > slot.len {
                    return Err(DecodeError::ValueOverflow {
                        value: raw.len() as i64,
                        limit: format!("{}-byte decimal slot", slot.len),
                    });
                }
                tuple::write_decimal(tuple, slot, decimal_from_be(raw));
            }
        }
    }
    Ok(())
}

#[inline]
fn read_boolean(data: &mut &[u8]) -> Result<bool, DecodeError> {
    let raw = read_exact(data, 1)?;
    match raw[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DecodeError::InvalidValue(format!(
            "invalid boolean byte {:#04x}",
            other
        ))),
    }
}

#[inline]
fn read_exact<'a>(data: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    let slice = *data;
    if slice.len() < n {
        return Err(DecodeError::ShortRead);
    }
    *data = &slice[n..];
    Ok(&slice[..n])
}

#[inline]
fn read_len_prefixed<'a>(data: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let len = decode_zigzag(data)?;
    if len < 0 {
        return Err(DecodeError::InvalidValue(format!(
            "negative length {}",
            len
        )));
    }
    read_exact(data, len as usize)
}

/// Interpret big-endian two's complement bytes as an i128.
#[inline]
fn decimal_from_be(raw: &[u8]) -> i128 {
    let fill = if raw.first().is_some_and(|b| b & 0x80 != 0) {
        0xFF
    } else {
        0x00
    };
    let mut buf = [fill; 16];
    buf[16 - raw.len()..].copy_from_slice(raw);
    i128::from_be_bytes(buf)
}
