//! In-memory Avro schema model.
//!
//! The scanner flattens schemas into [`SchemaElement`] trees: records with
//! named fields, and scalar leaves. Two-branch `[null, T]` unions collapse
//! into the inner element with `null_union_position` recording which
//! branch was null; the wire-level branch index is read back against that
//! position during decoding.

use std::sync::Arc;

use serde_json::Value;

use crate::tuple::SlotDescriptor;

/// Scalar leaf kinds the scanner materializes.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarKind {
    /// Null type (no wire representation)
    Null,
    /// Boolean
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit IEEE 754 float
    Float,
    /// 64-bit IEEE 754 float
    Double,
    /// UTF-8 string
    String,
    /// Byte sequence
    Bytes,
    /// Fixed-point decimal logical type
    Decimal {
        /// Total digit count
        precision: u32,
        /// Digits after the point
        scale: u32,
        /// Wire width when backed by an Avro `fixed`; `None` for the
        /// length-prefixed `bytes` encoding
        fixed_size: Option<usize>,
    },
}

impl ScalarKind {
    /// Lowercase Avro type name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Null => "null",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Int => "int",
            ScalarKind::Long => "long",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
            ScalarKind::String => "string",
            ScalarKind::Bytes => "bytes",
            ScalarKind::Decimal { .. } => "decimal",
        }
    }
}

/// Payload of a schema element: a scalar leaf or a record.
#[derive(Debug, Clone)]
pub enum ElementKind {
    /// Scalar leaf
    Scalar(ScalarKind),
    /// Record with ordered named fields
    Record {
        /// Record name from the schema JSON
        name: String,
        /// Ordered fields
        fields: Vec<SchemaField>,
    },
}

/// One node of a flattened Avro schema.
#[derive(Debug, Clone)]
pub struct SchemaElement {
    /// Scalar or record payload
    pub kind: ElementKind,
    /// For elements lifted out of a `[null, T]` union: the union branch
    /// index (0 or 1) that encodes null
    pub null_union_position: Option<u8>,
    /// Slot fed by this leaf, installed by schema resolution on the
    /// writer tree; `None` means the value is decoded and discarded
    pub slot: Option<Arc<SlotDescriptor>>,
}

/// A named record field.
#[derive(Debug, Clone)]
pub struct SchemaField {
    /// Field name
    pub name: String,
    /// Default value from the schema JSON, if declared
    pub default: Option<Value>,
    /// Field type
    pub element: SchemaElement,
}

impl SchemaElement {
    /// Scalar leaf element.
    pub fn scalar(kind: ScalarKind) -> Self {
        Self {
            kind: ElementKind::Scalar(kind),
            null_union_position: None,
            slot: None,
        }
    }

    /// Record element.
    pub fn record(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        Self {
            kind: ElementKind::Record {
                name: name.into(),
                fields,
            },
            null_union_position: None,
            slot: None,
        }
    }

    /// Mark this element as lifted from a nullable union.
    pub fn with_null_position(mut self, position: u8) -> Self {
        self.null_union_position = Some(position);
        self
    }

    /// True if the element came from a `[null, T]` union.
    pub fn nullable(&self) -> bool {
        self.null_union_position.is_some()
    }

    /// True if the element is a record.
    pub fn is_record(&self) -> bool {
        matches!(self.kind, ElementKind::Record { .. })
    }

    /// Record fields, if this element is a record.
    pub fn fields(&self) -> Option<&[SchemaField]> {
        match &self.kind {
            ElementKind::Record { fields, .. } => Some(fields),
            ElementKind::Scalar(_) => None,
        }
    }

    /// Mutable record fields, if this element is a record.
    pub fn fields_mut(&mut self) -> Option<&mut [SchemaField]> {
        match &mut self.kind {
            ElementKind::Record { fields, .. } => Some(fields),
            ElementKind::Scalar(_) => None,
        }
    }

    /// Index of a record field by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields()?.iter().position(|f| f.name == name)
    }

    /// Scalar kind, if this element is a leaf.
    pub fn scalar_kind(&self) -> Option<&ScalarKind> {
        match &self.kind {
            ElementKind::Scalar(kind) => Some(kind),
            ElementKind::Record { .. } => None,
        }
    }

    /// Avro type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ElementKind::Scalar(kind) => kind.name(),
            ElementKind::Record { .. } => "record",
        }
    }

    /// Structural equality: kinds, field names and order, nullability and
    /// null-branch positions. Defaults, record names, and slot
    /// annotations are ignored — this is the test gating the specialized
    /// decoder, and defaults never affect the wire format.
    pub fn structurally_equal(&self, other: &SchemaElement) -> bool {
        if self.null_union_position != other.null_union_position {
            return false;
        }
        match (&self.kind, &other.kind) {
            (ElementKind::Scalar(a), ElementKind::Scalar(b)) => a == b,
            (
                ElementKind::Record { fields: a, .. },
                ElementKind::Record { fields: b, .. },
            ) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(fa, fb)| {
                        fa.name == fb.name && fa.element.structurally_equal(&fb.element)
                    })
            }
            _ => false,
        }
    }
}

impl SchemaField {
    /// Field without a default value.
    pub fn new(name: impl Into<String>, element: SchemaElement) -> Self {
        Self {
            name: name.into(),
            default: None,
            element,
        }
    }

    /// Attach a default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}
