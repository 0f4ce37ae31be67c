//! Class enumeration and lookup.

use std::collections::HashSet;

use serde::Serialize;

use crate::cache::MetadataCache;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::remote::{expr, parse_pointer_array, BatchPlanner, RemoteBridge, RemoteScratch};

/// A class registered with the target runtime. The pointer stays valid for
/// the lifetime of the owning process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassHandle {
    pub pointer: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassList {
    pub names: Vec<String>,
    /// Count reported by the runtime before filtering.
    pub total: usize,
    pub from_cache: bool,
}

pub struct ClassCatalog<'a> {
    bridge: &'a dyn RemoteBridge,
    cache: &'a mut MetadataCache,
    settings: &'a Settings,
}

impl<'a> ClassCatalog<'a> {
    pub fn new(
        bridge: &'a dyn RemoteBridge,
        cache: &'a mut MetadataCache,
        settings: &'a Settings,
    ) -> Self {
        Self {
            bridge,
            cache,
            settings,
        }
    }

    /// Enumerate every registered class, pattern-filtered.
    ///
    /// Cache hit (same pid, no forced reload) returns a filtered copy with
    /// zero remote calls. A miss enumerates the runtime: one
    /// `objc_copyClassList` evaluation, one bulk pointer-array read, then
    /// batched name resolution. The unfiltered list is what gets cached.
    pub fn enumerate_all(
        &mut self,
        pattern: Option<&Pattern>,
        force_reload: bool,
    ) -> Result<ClassList> {
        let pid = self.bridge.process_id();

        if !force_reload {
            if let Some(entry) = self.cache.classes(pid) {
                return Ok(ClassList {
                    names: filter(&entry.names, pattern),
                    total: entry.total,
                    from_cache: true,
                });
            }
        }

        let (names, total) = self.load_classes()?;
        let filtered = filter(&names, pattern);
        self.cache.store_classes(pid, names, total);

        Ok(ClassList {
            names: filtered,
            total,
            from_cache: false,
        })
    }

    fn load_classes(&self) -> Result<(Vec<String>, usize)> {
        let count_cell = RemoteScratch::alloc(
            self.bridge,
            "alloc_count_cell",
            &expr::malloc_count_cell(),
        )?;

        let list_ptr = self
            .bridge
            .evaluate(&expr::copy_class_list(count_cell.address()))
            .map_err(|e| Error::remote("copy_class_list", e.to_string()))?;
        // The runtime hands us ownership of the list; free it on every path.
        let _list = RemoteScratch::new(self.bridge, list_ptr);

        let total = self
            .bridge
            .evaluate(&expr::read_count_cell(count_cell.address()))
            .map_err(|e| Error::remote("read_class_count", e.to_string()))?
            as usize;

        if total == 0 || list_ptr == 0 {
            return Ok((Vec::new(), 0));
        }

        let width = self.bridge.pointer_width();
        let bytes = self.bridge.read_memory(list_ptr, total * width.bytes())?;
        let pointers = parse_pointer_array(&bytes, total, width)?;

        let planner = BatchPlanner::new(self.settings);
        let names = planner
            .resolve_strings(self.bridge, &pointers, "class_names", |&p| {
                (p != 0).then(|| expr::class_name(p))
            })?
            .into_iter()
            .flatten()
            .collect();

        Ok((names, total))
    }

    /// Fast path for a single non-wildcard name: resolve it directly and
    /// confirm the runtime reports the same name back, in two remote calls
    /// regardless of how many classes the process holds. A miss is a normal
    /// negative result, never a reason to fall back to full enumeration.
    pub fn exact_lookup(&self, name: &str) -> Result<Option<ClassHandle>> {
        let pointer = self
            .bridge
            .evaluate(&expr::class_from_name(name))
            .map_err(|e| Error::remote("resolve_class", e.to_string()))?;
        if pointer == 0 {
            return Ok(None);
        }

        let name_ptr = self
            .bridge
            .evaluate(&expr::class_name(pointer))
            .map_err(|e| Error::remote("confirm_class_name", e.to_string()))?;
        if name_ptr == 0 {
            return Ok(None);
        }

        let reported = self
            .bridge
            .read_cstring(name_ptr, self.settings.cstring_max_len)?;
        if reported == name {
            Ok(Some(ClassHandle {
                pointer,
                name: reported,
            }))
        } else {
            Ok(None)
        }
    }

    /// Superclass chain from the class itself to the root, bounded by a
    /// fixed depth and a visited set since a misbehaving target may present
    /// cyclic metadata.
    pub fn hierarchy(&self, name: &str) -> Result<Vec<String>> {
        let mut pointer = self
            .bridge
            .evaluate(&expr::class_from_name(name))
            .map_err(|e| Error::remote("resolve_class", e.to_string()))?;
        if pointer == 0 {
            return Err(Error::ClassNotFound(name.to_string()));
        }

        let mut chain = Vec::new();
        let mut visited: HashSet<u64> = HashSet::new();

        for _ in 0..self.settings.max_hierarchy_depth {
            if !visited.insert(pointer) {
                tracing::warn!("Superclass cycle at 0x{pointer:x}, stopping walk");
                break;
            }

            let name_ptr = self
                .bridge
                .evaluate(&expr::class_name(pointer))
                .map_err(|e| Error::remote("hierarchy_class_name", e.to_string()))?;
            if name_ptr == 0 {
                break;
            }
            chain.push(
                self.bridge
                    .read_cstring(name_ptr, self.settings.cstring_max_len)?,
            );

            pointer = self
                .bridge
                .evaluate(&expr::superclass(pointer))
                .map_err(|e| Error::remote("hierarchy_superclass", e.to_string()))?;
            if pointer == 0 {
                break;
            }
        }

        Ok(chain)
    }

    /// Path of the binary image that registered the class, for provenance
    /// filtering. None when the runtime has no image on record.
    pub fn dylib_path(&self, name: &str) -> Result<Option<String>> {
        let pointer = self
            .bridge
            .evaluate(&expr::class_from_name(name))
            .map_err(|e| Error::remote("resolve_class", e.to_string()))?;
        if pointer == 0 {
            return Err(Error::ClassNotFound(name.to_string()));
        }

        let path_ptr = self
            .bridge
            .evaluate(&expr::image_name(pointer))
            .map_err(|e| Error::remote("class_image_name", e.to_string()))?;
        if path_ptr == 0 {
            return Ok(None);
        }

        // Image paths exceed the default name cap; read generously.
        let max = self.settings.cstring_max_len.max(1024);
        Ok(Some(self.bridge.read_cstring(path_ptr, max)?))
    }
}

fn filter(names: &[String], pattern: Option<&Pattern>) -> Vec<String> {
    match pattern {
        Some(p) => names.iter().filter(|n| p.matches(n)).cloned().collect(),
        None => names.to_vec(),
    }
}
