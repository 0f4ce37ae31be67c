//! Per-process metadata cache.
//!
//! Two stores: enumerated class names per process id, and method lists per
//! (process id, class name). Entries are written only on a cache miss inside
//! the enumerate operations, read on every later lookup, and die only on an
//! explicit clear or forced reload. No TTL, no eviction: one interactive
//! session, explicit invalidation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::catalog::methods::MethodDescriptor;
use crate::resolve::MethodKind;

#[derive(Debug, Clone)]
pub struct ClassListEntry {
    /// Unfiltered enumeration result; pattern filtering happens on read.
    pub names: Vec<String>,
    /// Count reported by the runtime, which can exceed the resolvable names.
    pub total: usize,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct MethodListEntry {
    pub instance: Option<Vec<MethodDescriptor>>,
    pub class_methods: Option<Vec<MethodDescriptor>>,
    pub cached_at: Option<DateTime<Utc>>,
}

/// Injected store object; sessions and tests get their own instance.
#[derive(Debug, Default)]
pub struct MetadataCache {
    classes: HashMap<u64, ClassListEntry>,
    methods: HashMap<(u64, String), MethodListEntry>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classes(&self, pid: u64) -> Option<&ClassListEntry> {
        self.classes.get(&pid)
    }

    pub fn store_classes(&mut self, pid: u64, names: Vec<String>, total: usize) {
        self.classes.insert(
            pid,
            ClassListEntry {
                names,
                total,
                cached_at: Utc::now(),
            },
        );
    }

    pub fn methods(&self, pid: u64, class: &str, kind: MethodKind) -> Option<&[MethodDescriptor]> {
        let entry = self.methods.get(&(pid, class.to_string()))?;
        let slot = match kind {
            MethodKind::Instance => entry.instance.as_ref(),
            MethodKind::Class => entry.class_methods.as_ref(),
        };
        slot.map(|v| v.as_slice())
    }

    pub fn store_methods(
        &mut self,
        pid: u64,
        class: &str,
        kind: MethodKind,
        methods: Vec<MethodDescriptor>,
    ) {
        let entry = self
            .methods
            .entry((pid, class.to_string()))
            .or_default();
        match kind {
            MethodKind::Instance => entry.instance = Some(methods),
            MethodKind::Class => entry.class_methods = Some(methods),
        }
        entry.cached_at = Some(Utc::now());
    }

    /// Drop everything cached for one process. Returns whether anything
    /// was actually dropped.
    pub fn clear(&mut self, pid: u64) -> bool {
        let had_classes = self.classes.remove(&pid).is_some();
        let before = self.methods.len();
        self.methods.retain(|(p, _), _| *p != pid);
        had_classes || self.methods.len() != before
    }

    pub fn clear_all(&mut self) {
        self.classes.clear();
        self.methods.clear();
    }
}
