//! Instance variable and property enumeration.
//!
//! Both share one shape: copy the member list, bulk-read the pointer array,
//! then one tuple batch returning a small fixed set of pointers per member,
//! followed by local string reads. Batching degrades to serial per-item
//! calls; it never silently drops a member.

use serde::Serialize;

use crate::config::Settings;
use crate::encoding::{decode_type_encoding, parse_property_attributes, PropertyAttributes};
use crate::error::{Error, Result};
use crate::remote::{expr, parse_pointer_array, BatchPlanner, RemoteBridge, RemoteScratch};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IvarDescriptor {
    pub name: String,
    pub type_encoding: String,
    /// Byte offset inside an instance; None when the runtime reports none.
    pub offset: Option<u64>,
    pub decoded_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Raw attribute string as the runtime encodes it.
    pub attributes: String,
    pub decoded: PropertyAttributes,
}

pub struct MemberCatalog<'a> {
    bridge: &'a dyn RemoteBridge,
    settings: &'a Settings,
}

impl<'a> MemberCatalog<'a> {
    pub fn new(bridge: &'a dyn RemoteBridge, settings: &'a Settings) -> Self {
        Self { bridge, settings }
    }

    pub fn ivars(&self, class_name: &str) -> Result<Vec<IvarDescriptor>> {
        let ivar_ptrs = self.copy_member_list(class_name, "copy_ivar_list", expr::copy_ivar_list)?;

        let planner = BatchPlanner::new(self.settings);
        let tuples = planner.resolve_words(self.bridge, &ivar_ptrs, 3, "ivar_info", |&p| {
            (p != 0).then(|| {
                vec![
                    expr::ivar_name(p),
                    expr::ivar_type_encoding(p),
                    expr::ivar_offset(p),
                ]
            })
        })?;

        let mut ivars = Vec::with_capacity(ivar_ptrs.len());
        for tuple in tuples.into_iter().flatten() {
            let (name_ptr, type_ptr, offset) = (tuple[0], tuple[1], tuple[2]);
            if name_ptr == 0 {
                continue;
            }
            let name = self
                .bridge
                .read_cstring(name_ptr, self.settings.cstring_max_len)?;
            let type_encoding = if type_ptr == 0 {
                "?".to_string()
            } else {
                self.bridge
                    .read_cstring(type_ptr, self.settings.cstring_max_len)?
            };
            ivars.push(IvarDescriptor {
                decoded_type: decode_type_encoding(&type_encoding),
                name,
                type_encoding,
                offset: (offset != 0).then_some(offset),
            });
        }
        Ok(ivars)
    }

    pub fn properties(&self, class_name: &str) -> Result<Vec<PropertyDescriptor>> {
        let prop_ptrs =
            self.copy_member_list(class_name, "copy_property_list", expr::copy_property_list)?;

        let planner = BatchPlanner::new(self.settings);
        let tuples = planner.resolve_words(self.bridge, &prop_ptrs, 2, "property_info", |&p| {
            (p != 0).then(|| vec![expr::property_name(p), expr::property_attributes(p)])
        })?;

        let mut properties = Vec::with_capacity(prop_ptrs.len());
        for tuple in tuples.into_iter().flatten() {
            let (name_ptr, attr_ptr) = (tuple[0], tuple[1]);
            if name_ptr == 0 {
                continue;
            }
            let name = self
                .bridge
                .read_cstring(name_ptr, self.settings.cstring_max_len)?;
            let attributes = if attr_ptr == 0 {
                String::new()
            } else {
                self.bridge
                    .read_cstring(attr_ptr, self.settings.cstring_max_len)?
            };
            properties.push(PropertyDescriptor {
                decoded: parse_property_attributes(&attributes),
                name,
                attributes,
            });
        }
        Ok(properties)
    }

    /// Shared copy-list + bulk-read preamble for both member kinds.
    fn copy_member_list(
        &self,
        class_name: &str,
        step: &'static str,
        copy_expr: fn(u64, u64) -> String,
    ) -> Result<Vec<u64>> {
        let class_ptr = self
            .bridge
            .evaluate(&expr::class_from_name(class_name))
            .map_err(|e| Error::remote("resolve_class", e.to_string()))?;
        if class_ptr == 0 {
            return Err(Error::ClassNotFound(class_name.to_string()));
        }

        let count_cell = RemoteScratch::alloc(
            self.bridge,
            "alloc_count_cell",
            &expr::malloc_count_cell(),
        )?;
        let list_ptr = self
            .bridge
            .evaluate(&copy_expr(class_ptr, count_cell.address()))
            .map_err(|e| Error::remote(step, e.to_string()))?;
        let _list = RemoteScratch::new(self.bridge, list_ptr);

        let count = self
            .bridge
            .evaluate(&expr::read_count_cell(count_cell.address()))
            .map_err(|e| Error::remote("read_member_count", e.to_string()))?
            as usize;
        if count == 0 || list_ptr == 0 {
            return Ok(Vec::new());
        }

        let width = self.bridge.pointer_width();
        let bytes = self.bridge.read_memory(list_ptr, count * width.bytes())?;
        parse_pointer_array(&bytes, count, width)
    }
}
