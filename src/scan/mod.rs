//! Scanner components: byte stream, header decoding, block loop, and the
//! interpreted and specialized record decoders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::schema::SchemaElement;
use crate::tuple::{SlotDescriptor, TupleLayout};

mod block;
pub mod header;
pub mod materialize;
pub mod program;
pub mod stream;
pub mod varint;

pub use block::Scanner;
pub use header::{parse_header, FileHeader, AVRO_VERSION_HEADER, SYNC_HASH_SIZE};
pub use materialize::materialize_record;
pub use program::{specialize, DecoderProgram};
pub use stream::{ByteStream, MemoryStream};

/// Per-scan configuration shared by every file of the scan.
///
/// Carries the reader (table) schema, the materialized slots with their
/// tuple layout, the table's partition-key count, and the cancellation
/// flag polled at block boundaries.
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// Reader schema the query expects; `None` fails `prepare`
    pub reader_schema: Option<SchemaElement>,
    /// Materialized output slots
    pub slots: Vec<Arc<SlotDescriptor>>,
    /// Byte layout of the output tuple
    pub layout: TupleLayout,
    /// Partition keys precede data columns in column paths
    pub num_partition_keys: usize,
    cancelled: Arc<AtomicBool>,
}

impl ScanContext {
    /// Context for a scan with the given reader schema and slots.
    pub fn new(
        reader_schema: SchemaElement,
        layout: TupleLayout,
        slots: Vec<Arc<SlotDescriptor>>,
    ) -> Self {
        Self {
            reader_schema: Some(reader_schema),
            slots,
            layout,
            num_partition_keys: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Context with no reader schema; `Scanner::prepare` will reject it.
    pub fn without_reader_schema(layout: TupleLayout, slots: Vec<Arc<SlotDescriptor>>) -> Self {
        Self {
            reader_schema: None,
            slots,
            layout,
            num_partition_keys: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the table's partition-key count.
    pub fn with_partition_keys(mut self, num_partition_keys: usize) -> Self {
        self.num_partition_keys = num_partition_keys;
        self
    }

    /// Handle for requesting cancellation from another thread.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
