//! Consolidated-buffer wire format.
//!
//! A batch result buffer is an offset table of N+1 little-endian u32 values
//! followed by a string heap. Offset i is the heap byte offset of item i's
//! NUL-terminated string, or [`ABSENT_OFFSET`] when item i is unavailable.
//! Offset N holds the total heap length, which is also the exact size of the
//! second memory read the planner issues.

use crate::error::{Error, Result};

/// Sentinel marking an unavailable slot in the offset table.
pub const ABSENT_OFFSET: u32 = 0xFFFF_FFFF;

/// Size in bytes of the offset table for `count` items.
pub fn offset_table_size(count: usize) -> usize {
    (count + 1) * 4
}

/// Parse the raw offset-table read into u32 offsets.
pub fn parse_offsets(bytes: &[u8], count: usize) -> Result<Vec<u32>> {
    let needed = offset_table_size(count);
    if bytes.len() < needed {
        return Err(Error::MalformedBuffer(format!(
            "offset table short read: got {} bytes, need {needed}",
            bytes.len()
        )));
    }
    Ok(bytes[..needed]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

/// Total heap length recorded in the final offset slot.
pub fn heap_len(offsets: &[u32]) -> Result<usize> {
    match offsets.last() {
        Some(&len) if len != ABSENT_OFFSET => Ok(len as usize),
        Some(_) => Err(Error::MalformedBuffer(
            "heap length slot holds the absent sentinel".to_string(),
        )),
        None => Err(Error::MalformedBuffer("empty offset table".to_string())),
    }
}

/// Slice the string heap into per-item strings.
///
/// `offsets` must have N+1 entries for N items. Absent slots decode to None.
/// Inconsistent offsets (past the heap, or a string with no terminator) are
/// malformed; the planner downgrades that to a serial per-item retry.
pub fn decode(offsets: &[u32], heap: &[u8]) -> Result<Vec<Option<String>>> {
    if offsets.is_empty() {
        return Err(Error::MalformedBuffer("empty offset table".to_string()));
    }
    let count = offsets.len() - 1;
    let total = heap_len(offsets)?;
    if heap.len() < total {
        return Err(Error::MalformedBuffer(format!(
            "heap short read: got {} bytes, table records {total}",
            heap.len()
        )));
    }

    let mut items = Vec::with_capacity(count);
    for (i, &offset) in offsets[..count].iter().enumerate() {
        if offset == ABSENT_OFFSET {
            items.push(None);
            continue;
        }
        let start = offset as usize;
        if start >= total {
            return Err(Error::MalformedBuffer(format!(
                "item {i} offset {start} past heap end {total}"
            )));
        }
        let Some(nul) = heap[start..total].iter().position(|&b| b == 0) else {
            return Err(Error::MalformedBuffer(format!(
                "item {i} has no terminator before heap end"
            )));
        };
        items.push(Some(
            String::from_utf8_lossy(&heap[start..start + nul]).into_owned(),
        ));
    }
    Ok(items)
}

/// Encode items into (offset table bytes, heap bytes). Used by tests and
/// fixtures to fabricate target-side buffers.
pub fn encode(items: &[Option<&str>]) -> (Vec<u8>, Vec<u8>) {
    let mut offsets: Vec<u32> = Vec::with_capacity(items.len() + 1);
    let mut heap: Vec<u8> = Vec::new();
    for item in items {
        match item {
            Some(s) => {
                offsets.push(heap.len() as u32);
                heap.extend_from_slice(s.as_bytes());
                heap.push(0);
            }
            None => offsets.push(ABSENT_OFFSET),
        }
    }
    offsets.push(heap.len() as u32);

    let table = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
    (table, heap)
}

/// Encode into one contiguous buffer (table followed by heap), matching the
/// layout a target-side batch block produces.
pub fn encode_contiguous(items: &[Option<&str>]) -> Vec<u8> {
    let (mut table, heap) = encode(items);
    table.extend_from_slice(&heap);
    table
}
