//! Block loop and scanner driver.
//!
//! After the header, a container file is a run of blocks: a zig-zag
//! record count, a zig-zag byte size, the (possibly compressed) payload,
//! and a copy of the header's sync marker. The scanner decodes each
//! block's records into sink-provided tuple batches, committing exactly
//! the rows that decoded cleanly.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::codec::Decompressor;
use crate::error::{DecodeError, ScanError};
use crate::schema::SchemaElement;
use crate::tuple::{MemPool, TupleSink};

use super::header::{self, FileHeader, SYNC_HASH_SIZE};
use super::materialize::materialize_record;
use super::program::DecoderProgram;
use super::stream::ByteStream;
use super::ScanContext;

/// One scanner instance drives one file on one thread.
///
/// Lifecycle: `prepare` validates the scan context, `parse_header` builds
/// the per-file state (schema resolution included), and `process_range`
/// runs the block loop to completion, row limit, or cancellation.
pub struct Scanner {
    ctx: ScanContext,
    header: Option<FileHeader>,
    decompressor: Option<Decompressor>,
    program: Option<DecoderProgram>,
}

impl Scanner {
    /// Create a scanner over the given scan context.
    pub fn new(ctx: ScanContext) -> Self {
        Self {
            ctx,
            header: None,
            decompressor: None,
            program: None,
        }
    }

    /// The scan context this scanner was built with.
    pub fn context(&self) -> &ScanContext {
        &self.ctx
    }

    /// Validate the scan context before any file bytes are read.
    pub fn prepare(&self) -> Result<(), ScanError> {
        match &self.ctx.reader_schema {
            Some(schema) if schema.is_record() => Ok(()),
            _ => Err(ScanError::Configuration(
                "Missing Avro table schema in scan context. This may be caused by stale \
                 table metadata."
                    .to_string(),
            )),
        }
    }

    /// Parse the file header and set up the per-file decode state.
    pub fn parse_header<S: ByteStream, K: TupleSink>(
        &mut self,
        stream: &mut S,
        sink: &mut K,
    ) -> Result<(), ScanError> {
        let header = header::parse_header(stream, &self.ctx, sink.pool())?;

        if header.codec.is_compressed() {
            self.decompressor = Some(Decompressor::new(header.codec));
        }

        if header.use_specialized_decoder {
            self.program = DecoderProgram::compile(&header.schema);
            match &self.program {
                Some(program) => debug!(
                    file = %stream.filename(),
                    ops = program.num_ops(),
                    "using specialized avro decoder"
                ),
                None => debug!(
                    file = %stream.filename(),
                    "specialized decoder unavailable, using interpreted path"
                ),
            }
        }

        self.header = Some(header);
        Ok(())
    }

    /// The parsed file header, if `parse_header` has run.
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Whether this file decodes through the specialized decoder.
    pub fn uses_specialized_decoder(&self) -> bool {
        self.program.is_some()
    }

    /// Drive the block loop until end of stream, row limit, or error.
    ///
    /// Rows decoded before a datum failure are committed before the
    /// error surfaces. Cancellation is polled between blocks and between
    /// batches; a cancelled scan drops the file header.
    pub fn process_range<S: ByteStream, K: TupleSink>(
        &mut self,
        stream: &mut S,
        sink: &mut K,
    ) -> Result<(), ScanError> {
        let header = self.header.take().ok_or_else(|| {
            ScanError::Configuration(
                "process_range called before parse_header".to_string(),
            )
        })?;

        let result = self.drive_blocks(&header, stream, sink);
        if !matches!(result, Err(ScanError::Cancelled { .. })) {
            self.header = Some(header);
        }
        result
    }

    fn drive_blocks<S: ByteStream, K: TupleSink>(
        &mut self,
        header: &FileHeader,
        stream: &mut S,
        sink: &mut K,
    ) -> Result<(), ScanError> {
        let file = stream.filename().to_string();

        while !stream.finished() {
            if self.ctx.is_cancelled() {
                return Err(ScanError::Cancelled { file });
            }

            // Block framing: record count, byte size, payload
            let count_offset = stream.file_offset();
            let num_records = stream
                .read_zlong()
                .map_err(|e| ScanError::decode(&file, count_offset, e))?;
            if num_records < 0 {
                return Err(ScanError::InvalidRecordCount {
                    file: file.clone(),
                    count: num_records,
                    offset: count_offset,
                });
            }

            let size_offset = stream.file_offset();
            let block_size = stream
                .read_zlong()
                .map_err(|e| ScanError::decode(&file, size_offset, e))?;
            if block_size < 0 {
                return Err(ScanError::InvalidCompressedSize {
                    file: file.clone(),
                    size: block_size,
                    offset: size_offset,
                });
            }

            let payload_offset = stream.file_offset();
            let data: Bytes = {
                let raw = stream
                    .read_bytes(block_size as usize)
                    .map_err(|e| ScanError::decode(&file, payload_offset, e))?;
                match &mut self.decompressor {
                    Some(decompressor) => {
                        let out = decompressor.process_block(raw).map_err(|e| {
                            ScanError::Codec {
                                file: file.clone(),
                                source: e,
                            }
                        })?;
                        trace!(
                            compressed = block_size,
                            decompressed = out.len(),
                            "decompressed avro block"
                        );
                        out
                    }
                    None => Bytes::copy_from_slice(raw),
                }
            };

            // Decode the block's records in sink-sized batches
            let mut cursor = &data[..];
            let mut remaining = num_records;
            while remaining > 0 {
                if self.ctx.is_cancelled() {
                    return Err(ScanError::Cancelled { file: file.clone() });
                }
                if sink.limit_reached() {
                    return Ok(());
                }

                if self.ctx.slots.is_empty() {
                    // No slots to materialize (count(*) scans): commit
                    // positions without touching the block bytes
                    let capacity = sink.reserve().capacity.max(1);
                    let batch = (remaining as usize).min(capacity);
                    sink.emit_empty(batch);
                    remaining -= batch as i64;
                    continue;
                }

                let (batch, decoded, decode_err) = {
                    let mem = sink.reserve();
                    let batch = (remaining as usize).min(mem.capacity);
                    let (decoded, decode_err) = decode_batch(
                        self.program.as_ref(),
                        &header.schema,
                        header.template_tuple.as_deref(),
                        self.ctx.layout.byte_size,
                        batch,
                        mem.pool,
                        &mut cursor,
                        mem.tuples,
                    );
                    (batch, decoded, decode_err)
                };

                sink.commit(decoded);
                if let Some(e) = decode_err {
                    return Err(ScanError::decode(&file, stream.file_offset(), e));
                }
                remaining -= batch as i64;
            }

            // Decompressed buffers that are not reused must outlive the
            // block for any tuples still referencing them
            if let Some(decompressor) = &self.decompressor {
                if !decompressor.reuse_output_buffer() {
                    sink.transfer_buffer(data.clone());
                }
            }

            read_sync(stream, &file, &header.sync)?;
        }

        Ok(())
    }
}

/// Decode up to `batch` records into consecutive tuples.
///
/// Returns the count of fully decoded rows and the failure (if any) that
/// stopped the batch early. Each tuple starts as a copy of the template
/// tuple, so defaulted slots are populated without consuming bytes.
#[allow(clippy::too_many_arguments)]
fn decode_batch(
    program: Option<&DecoderProgram>,
    schema: &SchemaElement,
    template: Option<&[u8]>,
    tuple_size: usize,
    batch: usize,
    pool: &mut MemPool,
    cursor: &mut &[u8],
    tuples: &mut [u8],
) -> (usize, Option<DecodeError>) {
    for row in 0..batch {
        let tuple = &mut tuples[row * tuple_size..(row + 1) * tuple_size];
        match template {
            Some(template) => tuple.copy_from_slice(template),
            None => tuple.fill(0),
        }

        let result = match program {
            Some(program) => program.decode_record(pool, cursor, tuple),
            None => materialize_record(schema, pool, cursor, tuple),
        };
        if let Err(e) = result {
            return (row, Some(e));
        }
    }
    (batch, None)
}

/// Read the 16 bytes after a block and require the header's sync marker.
fn read_sync<S: ByteStream>(
    stream: &mut S,
    file: &str,
    expected: &[u8; SYNC_HASH_SIZE],
) -> Result<(), ScanError> {
    let offset = stream.file_offset();
    let sync = stream
        .read_bytes(SYNC_HASH_SIZE)
        .map_err(|e| ScanError::decode(file, offset, e))?;
    if sync != expected {
        return Err(ScanError::SyncLost {
            file: file.to_string(),
            offset,
        });
    }
    Ok(())
}
