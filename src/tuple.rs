//! Fixed-layout tuple buffers, slot descriptors, and the tuple sink.
//!
//! Decoded rows land in flat byte tuples. Each materialized output column
//! is described by a [`SlotDescriptor`]: a byte offset into the tuple, a
//! null-indicator bit, and a physical type. Variable-length values live in
//! a [`MemPool`] arena; their slots store a pool offset and length, so
//! copying a tuple (including the pre-built template tuple) is a plain
//! byte copy for every slot kind.

use std::sync::Arc;

use bytes::Bytes;

/// Physical type of a materialized slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalType {
    /// 1-byte boolean
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit IEEE 754 float
    Float,
    /// 64-bit IEEE 754 float
    Double,
    /// Unbounded string or byte sequence (pool reference)
    String,
    /// Length-bounded string, truncated on overflow (pool reference)
    Varchar,
    /// Fixed-length string, space padded, stored inline
    Char,
    /// Fixed-point decimal stored inline as a little-endian integer
    Decimal,
}

impl PhysicalType {
    /// True for types fed by Avro string/bytes data.
    pub fn is_string_family(&self) -> bool {
        matches!(
            self,
            PhysicalType::String | PhysicalType::Varchar | PhysicalType::Char
        )
    }

    /// Lowercase name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalType::Boolean => "boolean",
            PhysicalType::Int32 => "int",
            PhysicalType::Int64 => "bigint",
            PhysicalType::Float => "float",
            PhysicalType::Double => "double",
            PhysicalType::String => "string",
            PhysicalType::Varchar => "varchar",
            PhysicalType::Char => "char",
            PhysicalType::Decimal => "decimal",
        }
    }
}

/// Width in bytes of a string-family pool reference slot: offset (u64)
/// plus length (u32), both little-endian.
pub const STRING_SLOT_SIZE: usize = 12;

/// Slot byte size for a decimal column of the given precision.
pub fn decimal_slot_size(precision: u32) -> usize {
    if precision <= 9 {
        4
    } else if precision <= 18 {
        8
    } else {
        16
    }
}

/// Position of a slot's null-indicator bit within the tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullIndicator {
    /// Byte holding the bit, relative to the tuple start
    pub byte_offset: usize,
    /// Mask selecting the bit within that byte
    pub bit_mask: u8,
}

/// Describes one materialized output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDescriptor {
    /// Ordinal path into the reader schema; the first index is offset by
    /// the table's partition-key count
    pub col_path: Vec<usize>,
    /// Target physical type
    pub physical_type: PhysicalType,
    /// Declared length for varchar/char, byte size for decimal, else 0
    pub len: usize,
    /// Byte offset of the slot value within the tuple
    pub tuple_offset: usize,
    /// Null-indicator bit for this slot
    pub null_indicator: NullIndicator,
}

impl SlotDescriptor {
    /// Width of this slot's value region in bytes.
    pub fn slot_width(&self) -> usize {
        match self.physical_type {
            PhysicalType::Boolean => 1,
            PhysicalType::Int32 | PhysicalType::Float => 4,
            PhysicalType::Int64 | PhysicalType::Double => 8,
            PhysicalType::String | PhysicalType::Varchar => STRING_SLOT_SIZE,
            PhysicalType::Char | PhysicalType::Decimal => self.len,
        }
    }
}

/// A column requested from the scanner, before layout assignment.
#[derive(Debug, Clone)]
pub struct SlotSpec {
    /// Ordinal path into the reader schema
    pub col_path: Vec<usize>,
    /// Target physical type
    pub physical_type: PhysicalType,
    /// Declared length for varchar/char/decimal columns
    pub len: usize,
}

impl SlotSpec {
    /// Spec for a fixed-width column.
    pub fn new(col_path: Vec<usize>, physical_type: PhysicalType) -> Self {
        Self {
            col_path,
            physical_type,
            len: 0,
        }
    }

    /// Spec for a length-carrying column (varchar, char, decimal).
    pub fn with_len(col_path: Vec<usize>, physical_type: PhysicalType, len: usize) -> Self {
        Self {
            col_path,
            physical_type,
            len,
        }
    }
}

/// Byte layout of one output tuple.
#[derive(Debug, Clone, Copy)]
pub struct TupleLayout {
    /// Total tuple width in bytes
    pub byte_size: usize,
    /// Leading bytes reserved for null-indicator bits
    pub null_bytes: usize,
}

impl TupleLayout {
    /// Assign offsets and null bits for the given slot specs.
    ///
    /// Null-indicator bits occupy the leading bytes; slot values follow in
    /// spec order. Returns the layout together with the finished
    /// descriptors.
    pub fn assign(specs: Vec<SlotSpec>) -> (TupleLayout, Vec<Arc<SlotDescriptor>>) {
        let null_bytes = specs.len().div_ceil(8);
        let mut offset = null_bytes;
        let mut slots = Vec::with_capacity(specs.len());

        for (i, spec) in specs.into_iter().enumerate() {
            let slot = SlotDescriptor {
                col_path: spec.col_path,
                physical_type: spec.physical_type,
                len: spec.len,
                tuple_offset: offset,
                null_indicator: NullIndicator {
                    byte_offset: i / 8,
                    bit_mask: 1 << (i % 8),
                },
            };
            offset += slot.slot_width();
            slots.push(Arc::new(slot));
        }

        (
            TupleLayout {
                byte_size: offset,
                null_bytes,
            },
            slots,
        )
    }
}

// ---------------------------------------------------------------------------
// Tuple slot accessors
// ---------------------------------------------------------------------------

/// Set a slot's null-indicator bit.
#[inline]
pub fn set_null(tuple: &mut [u8], slot: &SlotDescriptor) {
    tuple[slot.null_indicator.byte_offset] |= slot.null_indicator.bit_mask;
}

/// Test a slot's null-indicator bit.
#[inline]
pub fn is_null(tuple: &[u8], slot: &SlotDescriptor) -> bool {
    tuple[slot.null_indicator.byte_offset] & slot.null_indicator.bit_mask != 0
}

/// Write a boolean slot.
#[inline]
pub fn write_bool(tuple: &mut [u8], slot: &SlotDescriptor, value: bool) {
    tuple[slot.tuple_offset] = value as u8;
}

/// Write an Avro int into its slot, promoting to the slot's type.
#[inline]
pub fn write_int32(tuple: &mut [u8], slot: &SlotDescriptor, value: i32) {
    match slot.physical_type {
        PhysicalType::Int32 => write_fixed(tuple, slot.tuple_offset, &value.to_le_bytes()),
        PhysicalType::Int64 => write_fixed(tuple, slot.tuple_offset, &(value as i64).to_le_bytes()),
        PhysicalType::Float => write_fixed(tuple, slot.tuple_offset, &(value as f32).to_le_bytes()),
        PhysicalType::Double => write_fixed(tuple, slot.tuple_offset, &(value as f64).to_le_bytes()),
        _ => debug_assert!(false, "resolver admitted int into {:?}", slot.physical_type),
    }
}

/// Write an Avro long into its slot, promoting to the slot's type.
#[inline]
pub fn write_int64(tuple: &mut [u8], slot: &SlotDescriptor, value: i64) {
    match slot.physical_type {
        PhysicalType::Int64 => write_fixed(tuple, slot.tuple_offset, &value.to_le_bytes()),
        PhysicalType::Float => write_fixed(tuple, slot.tuple_offset, &(value as f32).to_le_bytes()),
        PhysicalType::Double => write_fixed(tuple, slot.tuple_offset, &(value as f64).to_le_bytes()),
        _ => debug_assert!(false, "resolver admitted long into {:?}", slot.physical_type),
    }
}

/// Write an Avro float into its slot, promoting to the slot's type.
#[inline]
pub fn write_float(tuple: &mut [u8], slot: &SlotDescriptor, value: f32) {
    match slot.physical_type {
        PhysicalType::Float => write_fixed(tuple, slot.tuple_offset, &value.to_le_bytes()),
        PhysicalType::Double => write_fixed(tuple, slot.tuple_offset, &(value as f64).to_le_bytes()),
        _ => debug_assert!(false, "resolver admitted float into {:?}", slot.physical_type),
    }
}

/// Write an Avro double into its slot.
#[inline]
pub fn write_double(tuple: &mut [u8], slot: &SlotDescriptor, value: f64) {
    debug_assert_eq!(slot.physical_type, PhysicalType::Double);
    write_fixed(tuple, slot.tuple_offset, &value.to_le_bytes());
}

/// Write string/bytes data into a string-family slot.
///
/// Varchar values are truncated to the declared length. Char values are
/// truncated and space padded, stored inline. String and varchar payloads
/// are copied into the pool and referenced by offset.
#[inline]
pub fn write_string(tuple: &mut [u8], slot: &SlotDescriptor, data: &[u8], pool: &mut MemPool) {
    match slot.physical_type {
        PhysicalType::String => {
            let (offset, len) = pool.alloc_bytes(data);
            write_string_ref(tuple, slot, offset, len);
        }
        PhysicalType::Varchar => {
            let clipped = &data[..data.len().min(slot.len)];
            let (offset, len) = pool.alloc_bytes(clipped);
            write_string_ref(tuple, slot, offset, len);
        }
        PhysicalType::Char => {
            let clipped = &data[..data.len().min(slot.len)];
            let dst = &mut tuple[slot.tuple_offset..slot.tuple_offset + slot.len];
            dst[..clipped.len()].copy_from_slice(clipped);
            dst[clipped.len()..].fill(b' ');
        }
        _ => debug_assert!(false, "resolver admitted string into {:?}", slot.physical_type),
    }
}

/// Write a decoded decimal (as i128) into an inline decimal slot.
#[inline]
pub fn write_decimal(tuple: &mut [u8], slot: &SlotDescriptor, value: i128) {
    debug_assert_eq!(slot.physical_type, PhysicalType::Decimal);
    let bytes = value.to_le_bytes();
    write_fixed(tuple, slot.tuple_offset, &bytes[..slot.len]);
}

#[inline]
fn write_fixed(tuple: &mut [u8], offset: usize, bytes: &[u8]) {
    tuple[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[inline]
fn write_string_ref(tuple: &mut [u8], slot: &SlotDescriptor, offset: u64, len: u32) {
    write_fixed(tuple, slot.tuple_offset, &offset.to_le_bytes());
    write_fixed(tuple, slot.tuple_offset + 8, &len.to_le_bytes());
}

/// Read back a fixed-width slot value (test and sink support).
pub fn read_fixed<const N: usize>(tuple: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&tuple[offset..offset + N]);
    out
}

/// Read back a string-family slot's pool reference.
pub fn read_string_ref(tuple: &[u8], slot: &SlotDescriptor) -> (u64, u32) {
    let offset = u64::from_le_bytes(read_fixed::<8>(tuple, slot.tuple_offset));
    let len = u32::from_le_bytes(read_fixed::<4>(tuple, slot.tuple_offset + 8));
    (offset, len)
}

// ---------------------------------------------------------------------------
// Memory pool
// ---------------------------------------------------------------------------

/// Append-only byte arena backing variable-length slot values.
///
/// Allocations return stable `(offset, len)` handles: the arena only
/// grows, so handles written into tuples stay valid for the pool's
/// lifetime. The pool can also retain foreign buffers (decompressed block
/// output) whose tuples' char data may still reference them.
#[derive(Debug, Default)]
pub struct MemPool {
    data: Vec<u8>,
    retained: Vec<Bytes>,
}

impl MemPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `bytes` into the arena, returning its (offset, len) handle.
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> (u64, u32) {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(bytes);
        (offset, bytes.len() as u32)
    }

    /// Resolve a handle produced by [`MemPool::alloc_bytes`].
    pub fn get(&self, offset: u64, len: u32) -> &[u8] {
        let start = offset as usize;
        &self.data[start..start + len as usize]
    }

    /// Take ownership of a buffer so it outlives the block that produced it.
    pub fn attach_buffer(&mut self, buffer: Bytes) {
        self.retained.push(buffer);
    }

    /// Total bytes held in the arena (excluding retained buffers).
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

// ---------------------------------------------------------------------------
// Tuple sink
// ---------------------------------------------------------------------------

/// Memory handed out by [`TupleSink::reserve`] for one batch.
pub struct BatchMem<'a> {
    /// Long-lived pool for variable-length values
    pub pool: &'a mut MemPool,
    /// Staging buffer holding `capacity` uncommitted tuples
    pub tuples: &'a mut [u8],
    /// Maximum rows the staging buffer holds
    pub capacity: usize,
}

/// Consumer of materialized rows.
///
/// `reserve` may be called repeatedly before a `commit`; it always
/// returns the current uncommitted batch memory.
pub trait TupleSink {
    /// Hand out staging memory for the next batch.
    fn reserve(&mut self) -> BatchMem<'_>;

    /// Accept the first `n` staged tuples as committed rows.
    fn commit(&mut self, n: usize);

    /// Commit up to `n` rows with no materialized slots (count(*) scans).
    /// Returns how many were actually committed under the row limit.
    fn emit_empty(&mut self, n: usize) -> usize;

    /// True once the query's row limit has been satisfied.
    fn limit_reached(&self) -> bool;

    /// Long-lived pool outliving every block of the scan.
    fn pool(&mut self) -> &mut MemPool;

    /// Retain a per-block buffer beyond the block that produced it.
    fn transfer_buffer(&mut self, buffer: Bytes);
}

/// A [`TupleSink`] that collects committed tuples in memory.
///
/// Used by the crate's tests and by embedders that want plain row
/// access rather than wiring their own sink.
#[derive(Debug)]
pub struct RowBatchSink {
    layout: TupleLayout,
    capacity: usize,
    pool: MemPool,
    staging: Vec<u8>,
    committed: Vec<u8>,
    rows: usize,
    limit: Option<usize>,
}

impl RowBatchSink {
    /// Sink with the given per-batch capacity and no row limit.
    pub fn new(layout: TupleLayout, capacity: usize) -> Self {
        Self {
            layout,
            capacity,
            pool: MemPool::new(),
            staging: vec![0u8; capacity * layout.byte_size.max(1)],
            committed: Vec::new(),
            rows: 0,
            limit: None,
        }
    }

    /// Apply a row limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Rows committed so far (materialized and empty).
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Byte view of a committed tuple.
    pub fn tuple(&self, row: usize) -> &[u8] {
        let size = self.layout.byte_size;
        &self.committed[row * size..(row + 1) * size]
    }

    /// Shared pool, for resolving string slots of committed rows.
    pub fn shared_pool(&self) -> &MemPool {
        &self.pool
    }

    /// Resolve a committed row's string-family slot against the pool.
    pub fn string_value(&self, row: usize, slot: &SlotDescriptor) -> &[u8] {
        let tuple = self.tuple(row);
        match slot.physical_type {
            PhysicalType::Char => &tuple[slot.tuple_offset..slot.tuple_offset + slot.len],
            _ => {
                let (offset, len) = read_string_ref(tuple, slot);
                self.pool.get(offset, len)
            }
        }
    }
}

impl TupleSink for RowBatchSink {
    fn reserve(&mut self) -> BatchMem<'_> {
        BatchMem {
            pool: &mut self.pool,
            tuples: &mut self.staging,
            capacity: self.capacity,
        }
    }

    fn commit(&mut self, n: usize) {
        let size = self.layout.byte_size;
        self.committed.extend_from_slice(&self.staging[..n * size]);
        self.rows += n;
    }

    fn emit_empty(&mut self, n: usize) -> usize {
        let accepted = match self.limit {
            Some(limit) => n.min(limit.saturating_sub(self.rows)),
            None => n,
        };
        self.rows += accepted;
        accepted
    }

    fn limit_reached(&self) -> bool {
        matches!(self.limit, Some(limit) if self.rows >= limit)
    }

    fn pool(&mut self) -> &mut MemPool {
        &mut self.pool
    }

    fn transfer_buffer(&mut self, buffer: Bytes) {
        self.pool.attach_buffer(buffer);
    }
}
