//! Error types for the Avro scanner

use thiserror::Error;

/// Errors raised while parsing or converting an Avro schema
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema JSON is structurally invalid
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// Schema uses a type the scanner does not materialize
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
    /// Schema value is not parseable JSON
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Errors raised by block decompression
#[derive(Debug, Error)]
pub enum CodecError {
    /// Codec string not in the supported set
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),
    /// Decompression failed or produced inconsistent output
    #[error("Decompression error: {0}")]
    DecompressionError(String),
}

/// Datum-level decode failures inside a block.
///
/// These carry no file context; the block loop attaches filename and
/// offset when it surfaces them as a [`ScanError`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Byte stream or block buffer underflow
    #[error("unexpected end of data")]
    ShortRead,
    /// Varint ran past the 10-byte limit for a 64-bit value
    #[error("invalid varint encoding")]
    InvalidVarint,
    /// A decoded value violates the wire format
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// A decoded value does not fit its target slot
    #[error("value {value} overflows {limit}")]
    ValueOverflow {
        /// The offending value (length, count, or magnitude)
        value: i64,
        /// Description of the exceeded limit
        limit: String,
    },
    /// A string exceeds the declared char length
    #[error("string of length {len} exceeds declared length {limit}")]
    StringTooLong {
        /// Decoded byte length
        len: usize,
        /// Declared column length
        limit: usize,
    },
}

/// Schema-resolution failures, surfaced while parsing the file header.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Column path points past the reader record's arity
    #[error("column path index {field_idx} out of range for record with {num_fields} fields")]
    MissingField {
        /// Index requested by the column path
        field_idx: usize,
        /// Arity of the reader record at that level
        num_fields: usize,
    },
    /// Field absent from the writer schema and the reader has no default
    #[error("field '{field}' is missing from the file schema and has no default value")]
    MissingDefault {
        /// Reader field name
        field: String,
    },
    /// Column path descends through a non-record field
    #[error("field '{field}' is not a record")]
    NotARecord {
        /// Offending field name
        field: String,
    },
    /// Nullable writer field feeding a non-nullable reader field
    #[error("nullable file field '{field}' cannot be read as a non-nullable column")]
    NullabilityMismatch {
        /// Offending field name
        field: String,
    },
    /// Writer type not promotable to the reader type
    #[error(
        "field '{field}': file type {writer_type} is not compatible with table type {reader_type}"
    )]
    SchemaResolutionError {
        /// Offending field name
        field: String,
        /// Reader-side type name
        reader_type: String,
        /// Writer-side type name
        writer_type: String,
    },
    /// Reader schema leaf not assignable to the materialized slot
    #[error("column '{field}': slot type {slot_type} does not match table schema type {reader_type}")]
    SchemaMetadataMismatch {
        /// Offending column name
        field: String,
        /// Physical slot type
        slot_type: String,
        /// Reader-side type name
        reader_type: String,
    },
    /// Default value of a kind the template tuple cannot hold
    #[error("field '{field}': unsupported default value of type {kind}")]
    UnsupportedDefault {
        /// Reader field name
        field: String,
        /// JSON kind of the default
        kind: String,
    },
    /// Default requested for a non-terminal (record) path step
    #[error("field '{field}': record default values are not supported")]
    UnsupportedDefaultRecord {
        /// Reader field name
        field: String,
    },
}

/// Top-level scanner error type.
///
/// Every surfaced variant names the file; framing and datum errors also
/// carry the file offset at which the failure was detected.
#[derive(Debug, Error)]
pub enum ScanError {
    /// First four bytes are not `Obj\x01`
    #[error("{file}: invalid Avro version header, found {found}")]
    BadVersionHeader {
        /// File being scanned
        file: String,
        /// Hex dump of the bytes actually read
        found: String,
    },

    /// Schema JSON in the header metadata failed to parse
    #[error("{file}: failed to parse file schema: {source}")]
    BadSchema {
        /// File being scanned
        file: String,
        /// Parser diagnostic
        #[source]
        source: SchemaError,
    },

    /// Writer schema missing or its record root has no fields
    #[error("{file}: schema not found in file header metadata")]
    EmptySchema {
        /// File being scanned
        file: String,
    },

    /// Negative metadata key or value length
    #[error("{file}: invalid metadata length {len} at offset {offset}")]
    InvalidLength {
        /// File being scanned
        file: String,
        /// The negative length read
        len: i64,
        /// File offset of the length field
        offset: u64,
    },

    /// Metadata map block count out of range
    #[error("{file}: invalid metadata count {count} at offset {offset}")]
    InvalidMetadataCount {
        /// File being scanned
        file: String,
        /// The offending count
        count: i64,
        /// File offset of the count field
        offset: u64,
    },

    /// Negative block record count
    #[error("{file}: invalid block record count {count} at offset {offset}")]
    InvalidRecordCount {
        /// File being scanned
        file: String,
        /// The offending count
        count: i64,
        /// File offset of the count field
        offset: u64,
    },

    /// Negative block byte size
    #[error("{file}: invalid compressed block size {size} at offset {offset}")]
    InvalidCompressedSize {
        /// File being scanned
        file: String,
        /// The offending size
        size: i64,
        /// File offset of the size field
        offset: u64,
    },

    /// Codec string outside {null, snappy, deflate}
    #[error("{file}: unknown Avro compression codec: {codec}")]
    UnknownCodec {
        /// File being scanned
        file: String,
        /// The unrecognized codec name
        codec: String,
    },

    /// Post-block sync marker does not match the header
    #[error("{file}: sync marker mismatch at offset {offset}")]
    SyncLost {
        /// File being scanned
        file: String,
        /// File offset of the mismatching marker
        offset: u64,
    },

    /// Schema resolution failed during header parsing
    #[error("{file}: {source}")]
    Resolve {
        /// File being scanned
        file: String,
        /// Resolution diagnostic
        #[source]
        source: ResolveError,
    },

    /// Datum or framing decode failure
    #[error("{file}: decode error at offset {offset}: {source}")]
    Decode {
        /// File being scanned
        file: String,
        /// File offset at which the failure was detected
        offset: u64,
        /// Underlying decode failure
        #[source]
        source: DecodeError,
    },

    /// Block decompression failure
    #[error("{file}: {source}")]
    Codec {
        /// File being scanned
        file: String,
        /// Underlying codec failure
        #[source]
        source: CodecError,
    },

    /// Scan cancelled between blocks or batches
    #[error("{file}: scan cancelled")]
    Cancelled {
        /// File being scanned
        file: String,
    },

    /// Scanner misconfiguration (caller contract violation)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ScanError {
    /// Wrap a datum-level failure with file context.
    pub(crate) fn decode(file: &str, offset: u64, source: DecodeError) -> Self {
        ScanError::Decode {
            file: file.to_string(),
            offset,
            source,
        }
    }
}
