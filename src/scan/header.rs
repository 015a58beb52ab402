//! Container-file header decoding.
//!
//! The header is: magic bytes (`Obj\x01`), a metadata map (Avro
//! `map<bytes>`), and a 16-byte sync marker. The `avro.schema` entry is
//! the writer schema; it is resolved against the scan's reader schema
//! immediately, so every schema failure surfaces before the first block
//! is touched.

use tracing::debug;

use crate::codec::Codec;
use crate::error::{DecodeError, ScanError, SchemaError};
use crate::schema::{parse_schema_bytes, SchemaElement};
use crate::tuple::MemPool;

use crate::schema::resolve::resolve_schemas;

use super::stream::ByteStream;
use super::ScanContext;

/// The Avro object container file magic: "Obj" plus version byte 1.
pub const AVRO_VERSION_HEADER: [u8; 4] = [b'O', b'b', b'j', 0x01];

/// Length of the sync marker separating blocks.
pub const SYNC_HASH_SIZE: usize = 16;

/// Metadata key carrying the writer schema JSON.
pub const AVRO_SCHEMA_KEY: &[u8] = b"avro.schema";

/// Metadata key carrying the block codec name.
pub const AVRO_CODEC_KEY: &[u8] = b"avro.codec";

/// Immutable per-file state built once when a file is opened.
#[derive(Debug)]
pub struct FileHeader {
    /// Writer schema tree, annotated with slots by resolution
    pub schema: SchemaElement,
    /// Row pre-filled with reader defaults for fields the writer lacks
    pub template_tuple: Option<Vec<u8>>,
    /// Sync marker expected after every block
    pub sync: [u8; SYNC_HASH_SIZE],
    /// Block codec
    pub codec: Codec,
    /// True iff reader and writer schemas are structurally identical
    pub use_specialized_decoder: bool,
    /// Bytes consumed by the header (blocks start here)
    pub header_size: u64,
}

/// Parse the file header and resolve its schema against the scan context.
///
/// String-valued defaults are copied into `pool`, which must be the
/// scan's long-lived pool.
pub fn parse_header<S: ByteStream>(
    stream: &mut S,
    ctx: &ScanContext,
    pool: &mut MemPool,
) -> Result<FileHeader, ScanError> {
    let file = stream.filename().to_string();

    let reader_schema = ctx.reader_schema.as_ref().ok_or_else(|| {
        ScanError::Configuration(
            "Missing Avro table schema in scan context. This may be caused by stale \
             table metadata."
                .to_string(),
        )
    })?;
    if !reader_schema.is_record() {
        return Err(ScanError::Configuration(
            "Avro table schema is not a record".to_string(),
        ));
    }

    // Version header
    let magic: [u8; 4] = {
        let offset = stream.file_offset();
        let raw = stream
            .read_bytes(AVRO_VERSION_HEADER.len())
            .map_err(|e| ScanError::decode(&file, offset, e))?;
        [raw[0], raw[1], raw[2], raw[3]]
    };
    if magic != AVRO_VERSION_HEADER {
        return Err(ScanError::BadVersionHeader {
            file,
            found: format!("{:02x?}", magic),
        });
    }

    let (schema_json, codec_name) = parse_metadata(stream, &file)?;

    // Writer schema, resolved against the reader schema
    let schema_json = schema_json.ok_or_else(|| ScanError::EmptySchema { file: file.clone() })?;
    let mut writer_schema = parse_schema_bytes(&schema_json).map_err(|e| ScanError::BadSchema {
        file: file.clone(),
        source: e,
    })?;
    match writer_schema.fields() {
        Some(fields) if !fields.is_empty() => {}
        Some(_) => return Err(ScanError::EmptySchema { file }),
        None => {
            return Err(ScanError::BadSchema {
                file,
                source: SchemaError::InvalidSchema("file schema root is not a record".to_string()),
            })
        }
    }

    let template_tuple = resolve_schemas(
        reader_schema,
        &mut writer_schema,
        &ctx.slots,
        ctx.num_partition_keys,
        &ctx.layout,
        pool,
    )
    .map_err(|e| ScanError::Resolve {
        file: file.clone(),
        source: e,
    })?;

    // The specialized decoder is built for the table schema only; files
    // written under an evolved schema take the interpreted path.
    let use_specialized_decoder = reader_schema.structurally_equal(&writer_schema);

    let codec = match codec_name {
        Some(name) => Codec::from_name(&name).map_err(|_| ScanError::UnknownCodec {
            file: file.clone(),
            codec: name,
        })?,
        None => Codec::Null,
    };

    // Sync marker
    let sync: [u8; SYNC_HASH_SIZE] = {
        let offset = stream.file_offset();
        let raw = stream
            .read_bytes(SYNC_HASH_SIZE)
            .map_err(|e| ScanError::decode(&file, offset, e))?;
        let mut sync = [0u8; SYNC_HASH_SIZE];
        sync.copy_from_slice(raw);
        sync
    };

    debug!(
        file = %file,
        codec = %codec,
        specialized = use_specialized_decoder,
        "parsed avro file header"
    );

    Ok(FileHeader {
        schema: writer_schema,
        template_tuple,
        sync,
        codec,
        use_specialized_decoder,
        header_size: stream.total_bytes_returned(),
    })
}

/// Decode the header metadata map, returning the `avro.schema` and
/// `avro.codec` values.
///
/// The map is a sequence of blocks, each a zig-zag count followed by
/// key/value pairs. A negative count is the Avro size-hint form: its
/// absolute value is the pair count and a byte-size long follows, which
/// is read and discarded.
fn parse_metadata<S: ByteStream>(
    stream: &mut S,
    file: &str,
) -> Result<(Option<Vec<u8>>, Option<String>), ScanError> {
    let mut schema_json: Option<Vec<u8>> = None;
    let mut codec_name: Option<String> = None;

    loop {
        let count_offset = stream.file_offset();
        let raw_count = stream
            .read_zlong()
            .map_err(|e| ScanError::decode(file, count_offset, e))?;
        if raw_count == 0 {
            break;
        }

        let count = if raw_count < 0 {
            let hint_offset = stream.file_offset();
            let _byte_size = stream
                .read_zlong()
                .map_err(|e| ScanError::decode(file, hint_offset, e))?;
            raw_count.checked_neg()
        } else {
            Some(raw_count)
        };
        let count = match count {
            Some(n) if n > 0 => n,
            _ => {
                return Err(ScanError::InvalidMetadataCount {
                    file: file.to_string(),
                    count: raw_count,
                    offset: count_offset,
                })
            }
        };

        for _ in 0..count {
            let key = read_sized(stream, file)?.to_vec();
            let value = read_sized(stream, file)?;

            if key == AVRO_SCHEMA_KEY {
                schema_json = Some(value.to_vec());
            } else if key == AVRO_CODEC_KEY {
                codec_name = Some(String::from_utf8_lossy(value).into_owned());
            } else {
                debug!(
                    file = %file,
                    key = %String::from_utf8_lossy(&key),
                    "skipping metadata entry"
                );
            }
        }
    }

    Ok((schema_json, codec_name))
}

/// Read one zig-zag-length-prefixed byte run of the metadata map.
fn read_sized<'a, S: ByteStream>(stream: &'a mut S, file: &str) -> Result<&'a [u8], ScanError> {
    let len_offset = stream.file_offset();
    let len = stream
        .read_zlong()
        .map_err(|e| ScanError::decode(file, len_offset, e))?;
    if len < 0 {
        return Err(ScanError::InvalidLength {
            file: file.to_string(),
            len,
            offset: len_offset,
        });
    }
    let data_offset = stream.file_offset();
    stream
        .read_bytes(len as usize)
        .map_err(|e: DecodeError| ScanError::decode(file, data_offset, e))
}
