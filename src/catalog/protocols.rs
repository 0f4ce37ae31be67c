//! Protocol enumeration and conformance scanning.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::cache::MetadataCache;
use crate::catalog::classes::ClassCatalog;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::remote::{expr, parse_pointer_array, BatchPlanner, RemoteBridge, RemoteScratch};

/// A protocol registered with the target runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolHandle {
    pub pointer: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConformingClass {
    pub name: String,
    /// True when the class itself declares conformance: it has no
    /// superclass, or its superclass does not conform.
    pub direct: bool,
}

/// Conforming classes grouped under their topmost conforming ancestor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConformanceGroup {
    pub ancestor: String,
    pub members: Vec<String>,
}

pub struct ProtocolCatalog<'a> {
    bridge: &'a dyn RemoteBridge,
    cache: &'a mut MetadataCache,
    settings: &'a Settings,
}

impl<'a> ProtocolCatalog<'a> {
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

    /// Enumerate registered protocols, pattern-filtered and sorted by name.
    /// Same batched shape as class enumeration.
    pub fn enumerate_all(&self, pattern: Option<&Pattern>) -> Result<Vec<ProtocolHandle>> {
        let count_cell = RemoteScratch::alloc(
            self.bridge,
            "alloc_count_cell",
            &expr::malloc_count_cell(),
        )?;
        let list_ptr = self
            .bridge
            .evaluate(&expr::copy_protocol_list(count_cell.address()))
            .map_err(|e| Error::remote("copy_protocol_list", e.to_string()))?;
        let _list = RemoteScratch::new(self.bridge, list_ptr);

        let count = self
            .bridge
            .evaluate(&expr::read_count_cell(count_cell.address()))
            .map_err(|e| Error::remote("read_protocol_count", e.to_string()))?
            as usize;
        if count == 0 || list_ptr == 0 {
            return Ok(Vec::new());
        }

        let width = self.bridge.pointer_width();
        let bytes = self.bridge.read_memory(list_ptr, count * width.bytes())?;
        let pointers = parse_pointer_array(&bytes, count, width)?;

        let planner = BatchPlanner::new(self.settings);
        let names = planner.resolve_strings(self.bridge, &pointers, "protocol_names", |&p| {
            (p != 0).then(|| expr::protocol_name(p))
        })?;

        let mut handles: Vec<ProtocolHandle> = pointers
            .into_iter()
            .zip(names)
            .filter_map(|(pointer, name)| {
                let name = name?;
                pattern
                    .map_or(true, |p| p.matches(&name))
                    .then_some(ProtocolHandle { pointer, name })
            })
            .collect();
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(handles)
    }

    /// Every class conforming to the protocol, with directness annotations.
    ///
    /// Reuses the class catalog's cached enumeration, then runs three batch
    /// passes: class-name to pointer, conformance flags, and a superclass
    /// re-check that decides which conformances are direct declarations.
    pub fn conforming_classes(
        &mut self,
        protocol_name: &str,
        direct_only: bool,
    ) -> Result<Vec<ConformingClass>> {
        let proto_ptr = self
            .bridge
            .evaluate(&expr::protocol_from_name(protocol_name))
            .map_err(|e| Error::remote("resolve_protocol", e.to_string()))?;
        if proto_ptr == 0 {
            return Err(Error::ProtocolNotFound(protocol_name.to_string()));
        }

        let class_names =
            ClassCatalog::new(self.bridge, self.cache, self.settings)
                .enumerate_all(None, false)?
                .names;

        let candidates = self.class_pointers(&class_names)?;

        let planner = BatchPlanner::new(self.settings);
        let flags = planner.resolve_flags(self.bridge, &candidates, "conformance", |(_, ptr)| {
            Some(expr::conforms_to_protocol(*ptr, proto_ptr))
        })?;
        let conforming: Vec<(String, u64)> = candidates
            .into_iter()
            .zip(flags)
            .filter_map(|(c, ok)| ok.then_some(c))
            .collect();

        let super_ptrs = planner.resolve_words(
            self.bridge,
            &conforming,
            1,
            "superclass_pointers",
            |(_, ptr)| Some(vec![expr::superclass(*ptr)]),
        )?;
        let super_ptrs: Vec<u64> = super_ptrs
            .into_iter()
            .map(|w| w.map_or(0, |w| w[0]))
            .collect();

        let super_conforms =
            planner.resolve_flags(self.bridge, &super_ptrs, "super_conformance", |&sp| {
                (sp != 0).then(|| expr::conforms_to_protocol(sp, proto_ptr))
            })?;

        let mut result = Vec::with_capacity(conforming.len());
        for (((name, _), super_ptr), inherited) in conforming
            .into_iter()
            .zip(super_ptrs)
            .zip(super_conforms)
        {
            let direct = super_ptr == 0 || !inherited;
            if direct_only && !direct {
                continue;
            }
            result.push(ConformingClass { name, direct });
        }
        Ok(result)
    }

    /// Group conforming classes under their topmost conforming ancestor for
    /// display. One extra batch builds the superclass-name map; the upward
    /// walks are visited-set guarded against cyclic metadata.
    pub fn grouped_conformance(&mut self, protocol_name: &str) -> Result<Vec<ConformanceGroup>> {
        let conforming = self.conforming_classes(protocol_name, false)?;
        if conforming.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = conforming.into_iter().map(|c| c.name).collect();
        let conforming_set: HashSet<&str> = names.iter().map(String::as_str).collect();

        let with_ptrs = self.class_pointers(&names)?;

        let planner = BatchPlanner::new(self.settings);
        let super_ptrs = planner.resolve_words(
            self.bridge,
            &with_ptrs,
            1,
            "superclass_pointers",
            |(_, ptr)| Some(vec![expr::superclass(*ptr)]),
        )?;
        let super_ptrs: Vec<u64> = super_ptrs
            .into_iter()
            .map(|w| w.map_or(0, |w| w[0]))
            .collect();

        let super_names =
            planner.resolve_strings(self.bridge, &super_ptrs, "superclass_names", |&sp| {
                (sp != 0).then(|| expr::class_name(sp))
            })?;

        let superclass_map: HashMap<&str, String> = with_ptrs
            .iter()
            .zip(super_names)
            .filter_map(|((name, _), sup)| Some((name.as_str(), sup?)))
            .collect();

        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for name in &names {
            let root = topmost_conforming(name, &superclass_map, &conforming_set);
            if root != *name {
                groups.entry(root).or_default().push(name.clone());
            } else {
                groups.entry(root).or_default();
            }
        }

        let mut result: Vec<ConformanceGroup> = groups
            .into_iter()
            .map(|(ancestor, mut members)| {
                members.sort();
                ConformanceGroup { ancestor, members }
            })
            .collect();
        result.sort_by(|a, b| a.ancestor.cmp(&b.ancestor));
        Ok(result)
    }

    /// Batch-resolve class names to pointers, dropping unresolvable names.
    fn class_pointers(&self, names: &[String]) -> Result<Vec<(String, u64)>> {
        let planner = BatchPlanner::new(self.settings);
        let ptrs = planner.resolve_words(self.bridge, names, 1, "class_pointers", |name| {
            Some(vec![expr::class_from_name(name)])
        })?;
        Ok(names
            .iter()
            .zip(ptrs)
            .filter_map(|(name, w)| {
                let ptr = w.map_or(0, |w| w[0]);
                (ptr != 0).then(|| (name.clone(), ptr))
            })
            .collect())
    }
}

/// Walk upward through the superclass-name map to the topmost ancestor that
/// still conforms. The visited set stops cycles a corrupt target may present.
fn topmost_conforming(
    class: &str,
    superclass_map: &HashMap<&str, String>,
    conforming: &HashSet<&str>,
) -> String {
    let mut current = class;
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(current);

    while let Some(sup) = superclass_map.get(current) {
        if !conforming.contains(sup.as_str()) || !visited.insert(sup.as_str()) {
            break;
        }
        current = sup.as_str();
    }
    current.to_string()
}
