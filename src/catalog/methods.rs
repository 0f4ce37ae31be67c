//! Method enumeration with category and ownership provenance.

use serde::Serialize;

use crate::cache::MetadataCache;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::remote::{expr, parse_pointer_array, BatchPlanner, RemoteBridge, RemoteScratch};
use crate::resolve::{parse_method_symbol, MethodKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDescriptor {
    pub selector: String,
    /// Implementation entry point; 0 when the batch could not resolve it.
    pub address: u64,
    pub kind: MethodKind,
    /// Category the method was compiled into, per the implementation symbol.
    pub category: Option<String>,
    /// Set when the implementation symbol names a different class.
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodList {
    pub methods: Vec<MethodDescriptor>,
    pub from_cache: bool,
}

pub struct MethodCatalog<'a> {
    bridge: &'a dyn RemoteBridge,
    cache: &'a mut MetadataCache,
    settings: &'a Settings,
}

impl<'a> MethodCatalog<'a> {
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

    /// Enumerate a class's own methods of one kind. Class-side methods are
    /// read off the metaclass. Results are cached per (pid, class name);
    /// a hit costs zero remote calls.
    pub fn enumerate(
        &mut self,
        class_name: &str,
        kind: MethodKind,
        force_reload: bool,
    ) -> Result<MethodList> {
        let pid = self.bridge.process_id();

        if !force_reload {
            if let Some(methods) = self.cache.methods(pid, class_name, kind) {
                return Ok(MethodList {
                    methods: methods.to_vec(),
                    from_cache: true,
                });
            }
        }

        let methods = self.load_methods(class_name, kind)?;
        self.cache
            .store_methods(pid, class_name, kind, methods.clone());

        Ok(MethodList {
            methods,
            from_cache: false,
        })
    }

    fn load_methods(&self, class_name: &str, kind: MethodKind) -> Result<Vec<MethodDescriptor>> {
        let class_ptr = self
            .bridge
            .evaluate(&expr::class_from_name(class_name))
            .map_err(|e| Error::remote("resolve_class", e.to_string()))?;
        if class_ptr == 0 {
            return Err(Error::ClassNotFound(class_name.to_string()));
        }

        let list_owner = match kind {
            MethodKind::Instance => class_ptr,
            MethodKind::Class => self
                .bridge
                .evaluate(&expr::metaclass(class_ptr))
                .map_err(|e| Error::remote("resolve_metaclass", e.to_string()))?,
        };

        let count_cell = RemoteScratch::alloc(
            self.bridge,
            "alloc_count_cell",
            &expr::malloc_count_cell(),
        )?;
        let list_ptr = self
            .bridge
            .evaluate(&expr::copy_method_list(list_owner, count_cell.address()))
            .map_err(|e| Error::remote("copy_method_list", e.to_string()))?;
        let _list = RemoteScratch::new(self.bridge, list_ptr);

        let count = self
            .bridge
            .evaluate(&expr::read_count_cell(count_cell.address()))
            .map_err(|e| Error::remote("read_method_count", e.to_string()))?
            as usize;
        if count == 0 || list_ptr == 0 {
            return Ok(Vec::new());
        }

        let width = self.bridge.pointer_width();
        let bytes = self.bridge.read_memory(list_ptr, count * width.bytes())?;
        let method_ptrs = parse_pointer_array(&bytes, count, width)?;

        // One tuple of (selector-name pointer, implementation) per method.
        let planner = BatchPlanner::new(self.settings);
        let pairs = planner.resolve_words(self.bridge, &method_ptrs, 2, "method_info", |&m| {
            (m != 0).then(|| {
                vec![
                    expr::selector_name_of_method(m),
                    expr::implementation_of_method(m),
                ]
            })
        })?;

        let mut methods = Vec::with_capacity(count);
        for pair in pairs.into_iter().flatten() {
            let (sel_ptr, address) = (pair[0], pair[1]);
            if sel_ptr == 0 {
                continue;
            }
            let selector = self
                .bridge
                .read_cstring(sel_ptr, self.settings.cstring_max_len)?;
            methods.push(MethodDescriptor {
                selector,
                address,
                kind,
                category: None,
                owner: None,
            });
        }

        // Provenance pass: best effort, absence of a symbol is not an error.
        for method in &mut methods {
            if method.address == 0 {
                continue;
            }
            let Some(symbol) = self.bridge.resolve_symbol(method.address) else {
                continue;
            };
            if let Some(parsed) = parse_method_symbol(&symbol) {
                method.category = parsed.category;
                if parsed.class != class_name {
                    method.owner = Some(parsed.class);
                }
            }
        }

        Ok(methods)
    }
}
