//! Avro object container file scanner for columnar query execution
//!
//! This library reads Avro container files the way an analytical engine's
//! scan node does: it parses the file header, resolves the embedded
//! writer schema against a table-level reader schema (type promotion,
//! nullability reconciliation, defaults for missing fields), and
//! materializes records into fixed-layout tuple buffers through a
//! caller-provided sink.
//!
//! Files whose schema matches the table schema decode through a
//! per-file specialized decoder; evolved files take the interpreted,
//! schema-directed path.

pub mod codec;
pub mod error;
pub mod scan;
pub mod schema;
pub mod tuple;

// Re-export main types
pub use codec::{Codec, Decompressor};
pub use error::{CodecError, DecodeError, ResolveError, ScanError, SchemaError};
pub use scan::{
    parse_header, specialize, ByteStream, DecoderProgram, FileHeader, MemoryStream, ScanContext,
    Scanner, AVRO_VERSION_HEADER, SYNC_HASH_SIZE,
};
pub use schema::{
    parse_schema, parse_schema_bytes, promote, resolve_schemas, slot_compatible, ElementKind,
    ScalarKind, SchemaElement, SchemaField,
};
pub use tuple::{
    decimal_slot_size, BatchMem, MemPool, NullIndicator, PhysicalType, RowBatchSink,
    SlotDescriptor, SlotSpec, TupleLayout, TupleSink,
};
