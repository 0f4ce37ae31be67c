use crate::error::{Error, Result};

/// Target pointer width reported by the debugger connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    Four,
    Eight,
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::Four => 4,
            PointerWidth::Eight => 8,
        }
    }
}

/// The only boundary this crate depends on: a stopped target process reachable
/// through a debugger that can run expressions and read memory.
///
/// Expression snippets are opaque to the bridge; it runs them in the target's
/// native expression language and hands back a pointer-sized scalar. All
/// operations are synchronous and assume the target is already stopped —
/// that precondition is the caller's to enforce.
pub trait RemoteBridge {
    /// Run an opaque expression in the target, returning its scalar result.
    fn evaluate(&self, code: &str) -> Result<u64>;

    /// Read raw bytes from target memory.
    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>>;

    /// Read a NUL-terminated string from target memory, bounded by `max_len`.
    fn read_cstring(&self, address: u64, max_len: usize) -> Result<String>;

    /// Resolve a load address to a symbol name, if the debugger knows one.
    /// Absence is not an error.
    fn resolve_symbol(&self, address: u64) -> Option<String>;

    fn pointer_width(&self) -> PointerWidth;

    /// Identifier of the target process, used to scope cache entries.
    fn process_id(&self) -> u64;
}

/// Parse a bulk pointer-array read according to the target's pointer width.
pub fn parse_pointer_array(bytes: &[u8], count: usize, width: PointerWidth) -> Result<Vec<u64>> {
    let stride = width.bytes();
    if bytes.len() < count * stride {
        return Err(Error::MalformedBuffer(format!(
            "pointer array short read: got {} bytes, need {}",
            bytes.len(),
            count * stride
        )));
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let chunk = &bytes[i * stride..(i + 1) * stride];
        let value = match width {
            PointerWidth::Four => u32::from_le_bytes(chunk.try_into().unwrap()) as u64,
            PointerWidth::Eight => u64::from_le_bytes(chunk.try_into().unwrap()),
        };
        out.push(value);
    }
    Ok(out)
}

/// A scratch allocation living in the debuggee's address space.
///
/// The buffer is heap memory inside the target, not ours, so it must be freed
/// on every exit path; Drop issues the target-side `free` and logs (but cannot
/// propagate) a failure.
pub struct RemoteScratch<'a> {
    bridge: &'a dyn RemoteBridge,
    address: u64,
}

impl std::fmt::Debug for RemoteScratch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteScratch")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl<'a> RemoteScratch<'a> {
    pub fn new(bridge: &'a dyn RemoteBridge, address: u64) -> Self {
        Self { bridge, address }
    }

    /// Evaluate an allocation expression and take ownership of the result.
    /// A zero result (target-side malloc failure) is reported as a remote error.
    pub fn alloc(bridge: &'a dyn RemoteBridge, step: &'static str, code: &str) -> Result<Self> {
        let address = bridge.evaluate(code)?;
        if address == 0 {
            return Err(Error::remote(step, "target allocation returned NULL"));
        }
        Ok(Self { bridge, address })
    }

    pub fn address(&self) -> u64 {
        self.address
    }
}

impl Drop for RemoteScratch<'_> {
    fn drop(&mut self) {
        if self.address == 0 {
            return;
        }
        let code = super::expr::free(self.address);
        if let Err(e) = self.bridge.evaluate(&code) {
            tracing::warn!(
                "Failed to free target scratch buffer at 0x{:x}: {}",
                self.address,
                e
            );
        }
    }
}
