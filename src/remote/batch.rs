//! Batch query planning: many small remote lookups, few round trips.
//!
//! Each batch costs one expression evaluation plus two memory reads (offset
//! table, then a heap read sized exactly to the recorded total) instead of one
//! evaluation per item. A failing compound expression or a malformed result
//! buffer downgrades that batch — and only that batch — to serial per-item
//! evaluation.

use super::bridge::{parse_pointer_array, RemoteBridge, RemoteScratch};
use super::{buffer, expr};
use crate::config::Settings;
use crate::error::Result;

pub struct BatchPlanner {
    batch_size: usize,
    cstring_max_len: usize,
}

impl BatchPlanner {
    pub fn new(settings: &Settings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            cstring_max_len: settings.cstring_max_len,
        }
    }

    /// Resolve one C-string per item through consolidated buffers.
    ///
    /// `item_expr` yields the `const char *` expression for an item, or None
    /// for items absent up front (null handles). Slots come back None when
    /// absent, unavailable in the target, or unreadable during a serial
    /// retry; the result always has exactly `items.len()` slots.
    pub fn resolve_strings<T>(
        &self,
        bridge: &dyn RemoteBridge,
        items: &[T],
        step: &'static str,
        item_expr: impl Fn(&T) -> Option<String>,
    ) -> Result<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(items.len());
        for chunk in items.chunks(self.batch_size) {
            let exprs: Vec<Option<String>> = chunk.iter().map(&item_expr).collect();
            match self.string_batch(bridge, step, &exprs) {
                Ok(strings) => out.extend(strings),
                Err(e) => {
                    tracing::warn!("Batch failed ({step}), retrying serially: {e}");
                    out.extend(self.string_serial(bridge, &exprs));
                }
            }
        }
        Ok(out)
    }

    fn string_batch(
        &self,
        bridge: &dyn RemoteBridge,
        step: &'static str,
        exprs: &[Option<String>],
    ) -> Result<Vec<Option<String>>> {
        let block = expr::string_batch_block(exprs);
        let scratch = RemoteScratch::alloc(bridge, step, &block)?;

        let table_size = buffer::offset_table_size(exprs.len());
        let table = bridge.read_memory(scratch.address(), table_size)?;
        let offsets = buffer::parse_offsets(&table, exprs.len())?;

        let total = buffer::heap_len(&offsets)?;
        let heap = if total > 0 {
            bridge.read_memory(scratch.address() + table_size as u64, total)?
        } else {
            Vec::new()
        };
        buffer::decode(&offsets, &heap)
    }

    fn string_serial(
        &self,
        bridge: &dyn RemoteBridge,
        exprs: &[Option<String>],
    ) -> Vec<Option<String>> {
        exprs
            .iter()
            .map(|item| {
                let code = item.as_ref()?;
                let ptr = match bridge.evaluate(code) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!("Serial string lookup failed: {e}");
                        return None;
                    }
                };
                if ptr == 0 {
                    return None;
                }
                match bridge.read_cstring(ptr, self.cstring_max_len) {
                    Ok(s) => Some(s),
                    Err(e) => {
                        tracing::debug!("Serial string read at 0x{ptr:x} failed: {e}");
                        None
                    }
                }
            })
            .collect()
    }

    /// Resolve a fixed tuple of `width` pointer-sized values per item.
    ///
    /// The batch form writes all tuples into one malloc'd array and reads it
    /// back in a single memory read. The serial fallback evaluates every slot
    /// expression individually and propagates failures, so a degraded batch
    /// still yields every item or a real error — never a silent gap.
    pub fn resolve_words<T>(
        &self,
        bridge: &dyn RemoteBridge,
        items: &[T],
        width: usize,
        step: &'static str,
        item_exprs: impl Fn(&T) -> Option<Vec<String>>,
    ) -> Result<Vec<Option<Vec<u64>>>> {
        let mut out = Vec::with_capacity(items.len());
        for chunk in items.chunks(self.batch_size) {
            let exprs: Vec<Option<Vec<String>>> = chunk.iter().map(&item_exprs).collect();
            match self.word_batch(bridge, width, step, &exprs) {
                Ok(words) => out.extend(words),
                Err(e) => {
                    tracing::warn!("Batch failed ({step}), retrying serially: {e}");
                    out.extend(self.word_serial(bridge, &exprs)?);
                }
            }
        }
        Ok(out)
    }

    fn word_batch(
        &self,
        bridge: &dyn RemoteBridge,
        width: usize,
        step: &'static str,
        exprs: &[Option<Vec<String>>],
    ) -> Result<Vec<Option<Vec<u64>>>> {
        let block = expr::word_batch_block(exprs, width);
        let scratch = RemoteScratch::alloc(bridge, step, &block)?;

        let stride = bridge.pointer_width().bytes();
        let bytes = bridge.read_memory(scratch.address(), exprs.len() * width * stride)?;
        let words = parse_pointer_array(&bytes, exprs.len() * width, bridge.pointer_width())?;

        Ok(exprs
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_ref()
                    .map(|_| words[i * width..(i + 1) * width].to_vec())
            })
            .collect())
    }

    fn word_serial(
        &self,
        bridge: &dyn RemoteBridge,
        exprs: &[Option<Vec<String>>],
    ) -> Result<Vec<Option<Vec<u64>>>> {
        exprs
            .iter()
            .map(|item| match item {
                Some(slots) => slots
                    .iter()
                    .map(|code| bridge.evaluate(code))
                    .collect::<Result<Vec<u64>>>()
                    .map(Some),
                None => Ok(None),
            })
            .collect()
    }

    /// Resolve one boolean per item (e.g. protocol conformance checks).
    /// Absent items are false.
    pub fn resolve_flags<T>(
        &self,
        bridge: &dyn RemoteBridge,
        items: &[T],
        step: &'static str,
        item_expr: impl Fn(&T) -> Option<String>,
    ) -> Result<Vec<bool>> {
        let mut out = Vec::with_capacity(items.len());
        for chunk in items.chunks(self.batch_size) {
            let exprs: Vec<Option<String>> = chunk.iter().map(&item_expr).collect();
            match self.flag_batch(bridge, step, &exprs) {
                Ok(flags) => out.extend(flags),
                Err(e) => {
                    tracing::warn!("Batch failed ({step}), retrying serially: {e}");
                    for item in &exprs {
                        match item {
                            Some(code) => out.push(bridge.evaluate(code)? != 0),
                            None => out.push(false),
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn flag_batch(
        &self,
        bridge: &dyn RemoteBridge,
        step: &'static str,
        exprs: &[Option<String>],
    ) -> Result<Vec<bool>> {
        let block = expr::byte_batch_block(exprs);
        let scratch = RemoteScratch::alloc(bridge, step, &block)?;
        let bytes = bridge.read_memory(scratch.address(), exprs.len())?;
        if bytes.len() < exprs.len() {
            return Err(crate::Error::MalformedBuffer(format!(
                "flag array short read: got {} bytes, need {}",
                bytes.len(),
                exprs.len()
            )));
        }
        Ok(bytes[..exprs.len()].iter().map(|&b| b != 0).collect())
    }
}
