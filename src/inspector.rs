//! High-level entry point tying the catalogs, resolver, and cache together.

use crate::cache::MetadataCache;
use crate::catalog::{
    ClassCatalog, ClassHandle, ClassList, ConformanceGroup, ConformingClass, IvarDescriptor,
    MemberCatalog, MethodCatalog, MethodList, PropertyDescriptor, ProtocolCatalog,
    ProtocolHandle,
};
use crate::config::Settings;
use crate::error::Result;
use crate::pattern::Pattern;
use crate::remote::RemoteBridge;
use crate::resolve::{
    parse_method_signature, DispatchProbe, MethodKind, MethodResolver, ResolvedMethod,
};

/// One inspector per debug session. Owns the metadata cache, so everything
/// learned about the target stays coherent across calls and is dropped
/// together when the session ends.
pub struct Inspector<B: RemoteBridge> {
    bridge: B,
    cache: MetadataCache,
    settings: Settings,
}

impl<B: RemoteBridge> Inspector<B> {
    pub fn new(bridge: B) -> Self {
        Self::with_settings(bridge, Settings::default())
    }

    pub fn with_settings(bridge: B, settings: Settings) -> Self {
        Self {
            bridge,
            cache: MetadataCache::new(),
            settings,
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Drop cached metadata for the current target. Returns whether anything
    /// was cached. Call after code injection or class registration changes.
    pub fn clear_cache(&mut self) -> bool {
        let pid = self.bridge.process_id();
        self.cache.clear(pid)
    }

    /// List classes registered in the target, optionally filtered. The
    /// pattern is fuzzy: substring by default, glob when it carries `*`/`?`.
    pub fn enumerate_classes(
        &mut self,
        pattern: Option<&str>,
        force_reload: bool,
    ) -> Result<ClassList> {
        let pattern = pattern.map(Pattern::fuzzy);
        ClassCatalog::new(&self.bridge, &mut self.cache, &self.settings)
            .enumerate_all(pattern.as_ref(), force_reload)
    }

    /// Exact class lookup. Two expression evaluations, no enumeration.
    pub fn lookup_class(&mut self, name: &str) -> Result<Option<ClassHandle>> {
        ClassCatalog::new(&self.bridge, &mut self.cache, &self.settings).exact_lookup(name)
    }

    /// Superclass chain starting at `name`, root last.
    pub fn class_hierarchy(&mut self, name: &str) -> Result<Vec<String>> {
        ClassCatalog::new(&self.bridge, &mut self.cache, &self.settings).hierarchy(name)
    }

    /// Path of the image that defines the class, if the runtime knows it.
    pub fn class_dylib(&mut self, name: &str) -> Result<Option<String>> {
        ClassCatalog::new(&self.bridge, &mut self.cache, &self.settings).dylib_path(name)
    }

    /// A class's own instance or class methods, with category and inherited
    /// ownership read off the implementation symbols.
    pub fn enumerate_methods(
        &mut self,
        class_name: &str,
        kind: MethodKind,
        force_reload: bool,
    ) -> Result<MethodList> {
        MethodCatalog::new(&self.bridge, &mut self.cache, &self.settings).enumerate(
            class_name,
            kind,
            force_reload,
        )
    }

    /// Registered protocols, optionally filtered, sorted by name.
    pub fn enumerate_protocols(&mut self, pattern: Option<&str>) -> Result<Vec<ProtocolHandle>> {
        let pattern = pattern.map(Pattern::fuzzy);
        ProtocolCatalog::new(&self.bridge, &mut self.cache, &self.settings)
            .enumerate_all(pattern.as_ref())
    }

    /// Classes conforming to a protocol. `direct_only` keeps just the ones
    /// that declare the conformance themselves.
    pub fn conforming_classes(
        &mut self,
        protocol_name: &str,
        direct_only: bool,
    ) -> Result<Vec<ConformingClass>> {
        ProtocolCatalog::new(&self.bridge, &mut self.cache, &self.settings)
            .conforming_classes(protocol_name, direct_only)
    }

    /// Conforming classes grouped under their topmost conforming ancestor.
    pub fn grouped_conformance(&mut self, protocol_name: &str) -> Result<Vec<ConformanceGroup>> {
        ProtocolCatalog::new(&self.bridge, &mut self.cache, &self.settings)
            .grouped_conformance(protocol_name)
    }

    /// Instance variables with decoded types and runtime offsets.
    pub fn ivars(&self, class_name: &str) -> Result<Vec<IvarDescriptor>> {
        MemberCatalog::new(&self.bridge, &self.settings).ivars(class_name)
    }

    /// Declared properties with parsed attribute strings.
    pub fn properties(&self, class_name: &str) -> Result<Vec<PropertyDescriptor>> {
        MemberCatalog::new(&self.bridge, &self.settings).properties(class_name)
    }

    /// Resolve a method to its implementation address.
    pub fn resolve_method(
        &self,
        class_name: &str,
        selector: &str,
        kind: MethodKind,
    ) -> Result<ResolvedMethod> {
        MethodResolver::new(&self.bridge).resolve(class_name, selector, kind)
    }

    /// Resolve from a `-[Class selector]` style signature. Without a `+`/`-`
    /// prefix the kind is probed from the runtime, defaulting to instance.
    pub fn resolve_signature(&self, input: &str) -> Result<ResolvedMethod> {
        let (kind, class_name, selector) = parse_method_signature(input)?;
        let resolver = MethodResolver::new(&self.bridge);
        let kind = match kind {
            Some(kind) => kind,
            None => resolver.detect_dispatch_kind(&class_name, &selector)?.kind(),
        };
        resolver.resolve(&class_name, &selector, kind)
    }

    /// Probe whether a bare `[Class selector]` names a class or instance
    /// method.
    pub fn detect_dispatch_kind(&self, class_name: &str, selector: &str) -> Result<DispatchProbe> {
        MethodResolver::new(&self.bridge).detect_dispatch_kind(class_name, selector)
    }
}
