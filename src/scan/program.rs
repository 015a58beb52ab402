//! Schema-specialized record decoder.
//!
//! When the reader and writer schemas are structurally identical, the
//! schema walk can be partially evaluated once per file: the resolved
//! tree flattens into a straight-line op sequence with per-field branches
//! only for the runtime null-union check. A tight dispatch loop then
//! replaces the recursive interpreter on the per-row hot path.
//!
//! The program shares its leaf readers and slot writers with the
//! interpreted materializer, so both paths produce identical tuples for
//! any valid input. Compilation declines schemas it does not cover; the
//! scanner silently falls back to the interpreted path in that case.

use std::sync::Arc;

use crate::error::DecodeError;
use crate::schema::{ElementKind, ScalarKind, SchemaElement};
use crate::tuple::{self, MemPool, SlotDescriptor};

use super::materialize::{read_scalar, read_union_branch};

/// One flattened field of the decoder program.
struct FieldOp {
    /// Present for fields lifted from a nullable union: the null branch
    /// index and how many following ops belong to this field's subtree
    /// (skipped when the field is null).
    null_check: Option<NullCheck>,
    /// Scalar kind to decode; `None` marks a nested-record entry whose
    /// children follow inline.
    scalar: Option<ScalarKind>,
    /// Slot annotation carried over from the resolved schema.
    slot: Option<Arc<SlotDescriptor>>,
}

struct NullCheck {
    null_position: u8,
    skip: usize,
}

/// A per-file decoder specialized to one resolved schema.
pub struct DecoderProgram {
    ops: Vec<FieldOp>,
}

/// Build a specialized decoder for a resolved record schema.
///
/// Returns `None` for schemas outside the program's coverage (decimal
/// leaves); callers fall back to the interpreted materializer.
pub fn specialize(root: &SchemaElement) -> Option<DecoderProgram> {
    DecoderProgram::compile(root)
}

impl DecoderProgram {
    /// Flatten `root` (a record) into a decoder program.
    pub fn compile(root: &SchemaElement) -> Option<Self> {
        let mut ops = Vec::new();
        flatten_record(root, &mut ops)?;
        Some(Self { ops })
    }

    /// Number of flattened field ops (diagnostics).
    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// Decode one record into `tuple`, consuming its bytes from `data`.
    ///
    /// Observably equivalent to the interpreted materializer over the
    /// same resolved schema.
    pub fn decode_record(
        &self,
        pool: &mut MemPool,
        data: &mut &[u8],
        tuple: &mut [u8],
    ) -> Result<(), DecodeError> {
        let mut pc = 0;
        while pc < self.ops.len() {
            let op = &self.ops[pc];
            pc += 1;

            if let Some(check) = &op.null_check {
                if read_union_branch(check.null_position, data)? {
                    if let Some(slot) = &op.slot {
                        tuple::set_null(tuple, slot);
                    }
                    pc += check.skip;
                    continue;
                }
            }

            match &op.scalar {
                Some(kind) => read_scalar(kind, op.slot.as_deref(), pool, data, tuple)?,
                // Nested record entry: children are the following ops
                None => {}
            }
        }
        Ok(())
    }
}

fn flatten_record(element: &SchemaElement, ops: &mut Vec<FieldOp>) -> Option<()> {
    for field in element.fields()? {
        let el = &field.element;
        match &el.kind {
            ElementKind::Record { .. } => {
                let entry = ops.len();
                ops.push(FieldOp {
                    null_check: el.null_union_position.map(|p| NullCheck {
                        null_position: p,
                        skip: 0,
                    }),
                    scalar: None,
                    slot: None,
                });
                flatten_record(el, ops)?;
                let skip = ops.len() - entry - 1;
                if let Some(check) = ops[entry].null_check.as_mut() {
                    check.skip = skip;
                }
            }
            ElementKind::Scalar(kind) => {
                // The decimal read depends on slot byte sizing the program
                // does not model; leave those schemas to the interpreter.
                if matches!(kind, ScalarKind::Decimal { .. }) {
                    return None;
                }
                ops.push(FieldOp {
                    null_check: el.null_union_position.map(|p| NullCheck {
                        null_position: p,
                        skip: 0,
                    }),
                    scalar: Some(kind.clone()),
                    slot: el.slot.clone(),
                });
            }
        }
    }
    Some(())
}
