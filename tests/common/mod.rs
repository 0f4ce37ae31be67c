//! An in-process stand-in for a debugged Objective-C target.
//!
//! `FakeRuntime` implements `RemoteBridge` by interpreting the expression
//! strings the crate emits: it maintains class/selector/method/protocol
//! tables, hands out pseudo-pointers, services the compound batch blocks by
//! building the same consolidated buffers a real target would, and tracks
//! target-side allocations so tests can assert nothing leaks.

// Each integration test file pulls in a different slice of the harness.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use regex::Regex;

use objlens::remote::buffer;
use objlens::{Error, PointerWidth, RemoteBridge, Result};

const FORWARD_SYMBOL: &str = "_objc_msgForward";

#[derive(Default)]
struct Inner {
    next_ptr: u64,
    classes: BTreeMap<String, u64>,
    class_names: HashMap<u64, String>,
    metaclasses: HashMap<u64, u64>,
    superclasses: HashMap<u64, u64>,
    images: HashMap<u64, String>,
    selectors: HashMap<String, u64>,
    selector_names: HashMap<u64, String>,
    methods: HashMap<u64, Vec<u64>>,
    method_selector: HashMap<u64, u64>,
    method_imp: HashMap<u64, u64>,
    symbols: HashMap<u64, String>,
    ivars: HashMap<u64, Vec<u64>>,
    ivar_info: HashMap<u64, (String, String, u64)>,
    properties: HashMap<u64, Vec<u64>>,
    property_info: HashMap<u64, (String, String)>,
    protocols: BTreeMap<String, u64>,
    protocol_names: HashMap<u64, String>,
    adoptions: HashSet<(u64, u64)>,
    cstrings: HashMap<String, u64>,
    memory: HashMap<u64, Vec<u8>>,
    allocations: HashSet<u64>,
    eval_count: usize,
    read_count: usize,
    forward_imp: u64,
    fail_batches: bool,
}

pub struct FakeRuntime {
    inner: RefCell<Inner>,
    pid: u64,
}

impl FakeRuntime {
    pub fn new() -> Self {
        let mut inner = Inner {
            next_ptr: 0x0010_0000,
            ..Inner::default()
        };
        let forward_imp = inner.next_ptr;
        inner.next_ptr += 0x100;
        inner.symbols.insert(forward_imp, FORWARD_SYMBOL.to_string());
        inner.forward_imp = forward_imp;
        Self {
            inner: RefCell::new(inner),
            pid: 7001,
        }
    }

    pub fn add_class(&self, name: &str, superclass: Option<&str>) {
        let mut inner = self.inner.borrow_mut();
        let class_ptr = inner.fresh_ptr();
        let meta_ptr = inner.fresh_ptr();
        inner.classes.insert(name.to_string(), class_ptr);
        inner.class_names.insert(class_ptr, name.to_string());
        inner.metaclasses.insert(class_ptr, meta_ptr);
        if let Some(super_name) = superclass {
            let super_ptr = *inner
                .classes
                .get(super_name)
                .unwrap_or_else(|| panic!("superclass {super_name} not registered"));
            let super_meta = inner.metaclasses[&super_ptr];
            inner.superclasses.insert(class_ptr, super_ptr);
            inner.superclasses.insert(meta_ptr, super_meta);
        }
    }

    pub fn set_image(&self, class: &str, path: &str) {
        let mut inner = self.inner.borrow_mut();
        let ptr = inner.class_ptr(class);
        inner.images.insert(ptr, path.to_string());
    }

    pub fn add_instance_method(&self, class: &str, selector: &str) -> u64 {
        self.add_method(class, selector, false, format!("-[{class} {selector}]"))
    }

    pub fn add_class_method(&self, class: &str, selector: &str) -> u64 {
        self.add_method(class, selector, true, format!("+[{class} {selector}]"))
    }

    pub fn add_category_method(&self, class: &str, category: &str, selector: &str) -> u64 {
        self.add_method(
            class,
            selector,
            false,
            format!("-[{class}({category}) {selector}]"),
        )
    }

    /// Register a selector whose implementation is the shared forwarding stub.
    pub fn add_forwarding_method(&self, class: &str, selector: &str) {
        let mut inner = self.inner.borrow_mut();
        let owner = inner.class_ptr(class);
        let sel = inner.intern_selector(selector);
        let method = inner.fresh_ptr();
        let forward = inner.forward_imp;
        inner.methods.entry(owner).or_default().push(method);
        inner.method_selector.insert(method, sel);
        inner.method_imp.insert(method, forward);
    }

    fn add_method(&self, class: &str, selector: &str, class_side: bool, symbol: String) -> u64 {
        let mut inner = self.inner.borrow_mut();
        let class_ptr = inner.class_ptr(class);
        let owner = if class_side {
            inner.metaclasses[&class_ptr]
        } else {
            class_ptr
        };
        let sel = inner.intern_selector(selector);
        let method = inner.fresh_ptr();
        let imp = inner.fresh_ptr();
        inner.methods.entry(owner).or_default().push(method);
        inner.method_selector.insert(method, sel);
        inner.method_imp.insert(method, imp);
        inner.symbols.insert(imp, symbol);
        imp
    }

    pub fn add_ivar(&self, class: &str, name: &str, encoding: &str, offset: u64) {
        let mut inner = self.inner.borrow_mut();
        let class_ptr = inner.class_ptr(class);
        let ivar = inner.fresh_ptr();
        inner.ivars.entry(class_ptr).or_default().push(ivar);
        inner
            .ivar_info
            .insert(ivar, (name.to_string(), encoding.to_string(), offset));
    }

    pub fn add_property(&self, class: &str, name: &str, attributes: &str) {
        let mut inner = self.inner.borrow_mut();
        let class_ptr = inner.class_ptr(class);
        let prop = inner.fresh_ptr();
        inner.properties.entry(class_ptr).or_default().push(prop);
        inner
            .property_info
            .insert(prop, (name.to_string(), attributes.to_string()));
    }

    pub fn add_protocol(&self, name: &str) {
        let mut inner = self.inner.borrow_mut();
        let ptr = inner.fresh_ptr();
        inner.protocols.insert(name.to_string(), ptr);
        inner.protocol_names.insert(ptr, name.to_string());
    }

    pub fn adopt_protocol(&self, class: &str, protocol: &str) {
        let mut inner = self.inner.borrow_mut();
        let class_ptr = inner.class_ptr(class);
        let proto_ptr = *inner
            .protocols
            .get(protocol)
            .unwrap_or_else(|| panic!("protocol {protocol} not registered"));
        inner.adoptions.insert((class_ptr, proto_ptr));
    }

    /// Make every compound batch block fail, forcing serial fallbacks.
    pub fn set_fail_batches(&self, on: bool) {
        self.inner.borrow_mut().fail_batches = on;
    }

    pub fn eval_count(&self) -> usize {
        self.inner.borrow().eval_count
    }

    pub fn read_count(&self) -> usize {
        self.inner.borrow().read_count
    }

    /// Target-side mallocs that have not been freed back.
    pub fn outstanding_allocations(&self) -> usize {
        self.inner.borrow().allocations.len()
    }
}

impl Inner {
    fn fresh_ptr(&mut self) -> u64 {
        let ptr = self.next_ptr;
        self.next_ptr += 0x100;
        ptr
    }

    fn class_ptr(&self, name: &str) -> u64 {
        *self
            .classes
            .get(name)
            .unwrap_or_else(|| panic!("class {name} not registered"))
    }

    fn intern_selector(&mut self, name: &str) -> u64 {
        if let Some(&ptr) = self.selectors.get(name) {
            return ptr;
        }
        let ptr = self.fresh_ptr();
        self.selectors.insert(name.to_string(), ptr);
        self.selector_names.insert(ptr, name.to_string());
        ptr
    }

    fn intern_cstring(&mut self, value: &str) -> u64 {
        if let Some(&ptr) = self.cstrings.get(value) {
            return ptr;
        }
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        let ptr = self.alloc_region(bytes, false);
        self.cstrings.insert(value.to_string(), ptr);
        ptr
    }

    /// Reserve a fresh region; `tracked` regions count as target-side mallocs
    /// the caller must free.
    fn alloc_region(&mut self, bytes: Vec<u8>, tracked: bool) -> u64 {
        let ptr = self.next_ptr;
        self.next_ptr += (bytes.len() as u64).max(8).next_multiple_of(0x100);
        self.memory.insert(ptr, bytes);
        if tracked {
            self.allocations.insert(ptr);
        }
        ptr
    }

    fn alloc_pointer_list(&mut self, count_cell: u64, ptrs: &[u64]) -> u64 {
        self.write_u32(count_cell, ptrs.len() as u32);
        if ptrs.is_empty() {
            return 0;
        }
        let mut bytes = Vec::with_capacity(ptrs.len() * 8);
        for p in ptrs {
            bytes.extend_from_slice(&p.to_le_bytes());
        }
        self.alloc_region(bytes, true)
    }

    fn write_u32(&mut self, address: u64, value: u32) {
        if let Some(region) = self.memory.get_mut(&address) {
            region[..4].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn read_bytes(&self, address: u64, len: usize) -> Option<Vec<u8>> {
        for (&base, bytes) in &self.memory {
            if address >= base && address + len as u64 <= base + bytes.len() as u64 {
                let start = (address - base) as usize;
                return Some(bytes[start..start + len].to_vec());
            }
        }
        None
    }

    fn read_cstring_at(&self, address: u64, max_len: usize) -> Option<String> {
        for (&base, bytes) in &self.memory {
            if address >= base && address < base + bytes.len() as u64 {
                let start = (address - base) as usize;
                let slice = &bytes[start..];
                let end = slice
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(slice.len())
                    .min(max_len);
                return Some(String::from_utf8_lossy(&slice[..end]).into_owned());
            }
        }
        None
    }

    /// Walk a class or metaclass chain looking for a selector.
    fn find_method(&self, mut owner: u64, sel: u64) -> Option<u64> {
        loop {
            if let Some(methods) = self.methods.get(&owner) {
                if let Some(&m) = methods.iter().find(|&&m| self.method_selector[&m] == sel) {
                    return Some(m);
                }
            }
            owner = *self.superclasses.get(&owner)?;
        }
    }

    fn conforms(&self, mut class_ptr: u64, proto_ptr: u64) -> bool {
        loop {
            if self.adoptions.contains(&(class_ptr, proto_ptr)) {
                return true;
            }
            match self.superclasses.get(&class_ptr) {
                Some(&s) => class_ptr = s,
                None => return false,
            }
        }
    }

    fn eval(&mut self, code: &str) -> std::result::Result<u64, String> {
        if code.starts_with("(void *)(^{") {
            return self.eval_block(code);
        }
        if let Some(addr) = hex_after(code, "free((void *)0x") {
            self.memory.remove(&addr);
            self.allocations.remove(&addr);
            return Ok(0);
        }
        if code == "(unsigned int *)malloc(sizeof(unsigned int))" {
            return Ok(self.alloc_region(vec![0; 4], true));
        }
        if let Some(cell) = hex_after(code, "*(unsigned int *)0x") {
            let bytes = self
                .read_bytes(cell, 4)
                .ok_or_else(|| format!("unmapped count cell 0x{cell:x}"))?;
            return Ok(u32::from_le_bytes(bytes.try_into().unwrap()) as u64);
        }
        if code.contains("objc_copyClassList") {
            let cell = hex_after(code, "(unsigned int *)0x").ok_or("missing count cell")?;
            let ptrs: Vec<u64> = self.classes.values().copied().collect();
            return Ok(self.alloc_pointer_list(cell, &ptrs));
        }
        if code.contains("objc_copyProtocolList") {
            let cell = hex_after(code, "(unsigned int *)0x").ok_or("missing count cell")?;
            let ptrs: Vec<u64> = self.protocols.values().copied().collect();
            return Ok(self.alloc_pointer_list(cell, &ptrs));
        }
        if code.contains("class_copyMethodList") {
            let owner = hex_after(code, "(Class)0x").ok_or("missing class")?;
            let cell = hex_after(code, "(unsigned int *)0x").ok_or("missing count cell")?;
            let ptrs = self.methods.get(&owner).cloned().unwrap_or_default();
            return Ok(self.alloc_pointer_list(cell, &ptrs));
        }
        if code.contains("class_copyIvarList") {
            let owner = hex_after(code, "(Class)0x").ok_or("missing class")?;
            let cell = hex_after(code, "(unsigned int *)0x").ok_or("missing count cell")?;
            let ptrs = self.ivars.get(&owner).cloned().unwrap_or_default();
            return Ok(self.alloc_pointer_list(cell, &ptrs));
        }
        if code.contains("class_copyPropertyList") {
            let owner = hex_after(code, "(Class)0x").ok_or("missing class")?;
            let cell = hex_after(code, "(unsigned int *)0x").ok_or("missing count cell")?;
            let ptrs = self.properties.get(&owner).cloned().unwrap_or_default();
            return Ok(self.alloc_pointer_list(cell, &ptrs));
        }
        if code.contains("NSClassFromString") {
            let name = quoted(code).ok_or("missing class literal")?;
            return Ok(self.classes.get(&name).copied().unwrap_or(0));
        }
        if code.contains("NSSelectorFromString") {
            let name = quoted(code).ok_or("missing selector literal")?;
            return Ok(self.intern_selector(&name));
        }
        if code.contains("objc_getProtocol") {
            let name = cstr_arg(code).ok_or("missing protocol literal")?;
            return Ok(self.protocols.get(&name).copied().unwrap_or(0));
        }
        if code.contains("protocol_getName") {
            let ptr = hex_after(code, "(void *)0x").ok_or("missing protocol")?;
            let name = self
                .protocol_names
                .get(&ptr)
                .cloned()
                .ok_or_else(|| format!("not a protocol: 0x{ptr:x}"))?;
            return Ok(self.intern_cstring(&name));
        }
        if code.contains("class_getMethodImplementation") {
            let owner = hex_after(code, "(Class)0x").ok_or("missing class")?;
            let sel = hex_after(code, "(SEL)0x").ok_or("missing selector")?;
            return Ok(self
                .find_method(owner, sel)
                .map_or(0, |m| self.method_imp[&m]));
        }
        if code.contains("class_getImageName") {
            let ptr = hex_after(code, "(Class)0x").ok_or("missing class")?;
            return Ok(match self.images.get(&ptr).cloned() {
                Some(path) => self.intern_cstring(&path),
                None => 0,
            });
        }
        if code.contains("class_getSuperclass") {
            let ptr = hex_after(code, "(Class)0x").ok_or("missing class")?;
            return Ok(self.superclasses.get(&ptr).copied().unwrap_or(0));
        }
        if code.contains("class_getName") {
            let ptr = hex_after(code, "(Class)0x").ok_or("missing class")?;
            let name = self
                .class_names
                .get(&ptr)
                .cloned()
                .ok_or_else(|| format!("not a class: 0x{ptr:x}"))?;
            return Ok(self.intern_cstring(&name));
        }
        if code.contains("object_getClass") {
            let ptr = hex_after(code, "(id)0x").ok_or("missing object")?;
            return Ok(self.metaclasses.get(&ptr).copied().unwrap_or(0));
        }
        if code.contains("sel_getName") {
            let method = hex_after(code, "(void *)0x").ok_or("missing method")?;
            let sel = self.method_selector[&method];
            let name = self.selector_names[&sel].clone();
            return Ok(self.intern_cstring(&name));
        }
        if code.contains("method_getImplementation") {
            let method = hex_after(code, "(void *)0x").ok_or("missing method")?;
            return Ok(self.method_imp[&method]);
        }
        if code.contains("ivar_getName") {
            let ivar = hex_after(code, "(void *)0x").ok_or("missing ivar")?;
            let name = self.ivar_info[&ivar].0.clone();
            return Ok(self.intern_cstring(&name));
        }
        if code.contains("ivar_getTypeEncoding") {
            let ivar = hex_after(code, "(void *)0x").ok_or("missing ivar")?;
            let encoding = self.ivar_info[&ivar].1.clone();
            return Ok(self.intern_cstring(&encoding));
        }
        if code.contains("ivar_getOffset") {
            let ivar = hex_after(code, "(void *)0x").ok_or("missing ivar")?;
            return Ok(self.ivar_info[&ivar].2);
        }
        if code.contains("property_getName") {
            let prop = hex_after(code, "(void *)0x").ok_or("missing property")?;
            let name = self.property_info[&prop].0.clone();
            return Ok(self.intern_cstring(&name));
        }
        if code.contains("property_getAttributes") {
            let prop = hex_after(code, "(void *)0x").ok_or("missing property")?;
            let attrs = self.property_info[&prop].1.clone();
            return Ok(self.intern_cstring(&attrs));
        }
        if code.contains("class_conformsToProtocol") {
            let class_ptr = hex_after(code, "(Class)0x").ok_or("missing class")?;
            let proto_ptr = hex_after(code, "(void *)0x").ok_or("missing protocol")?;
            return Ok(self.conforms(class_ptr, proto_ptr) as u64);
        }
        Err(format!("unrecognized expression: {code}"))
    }

    fn eval_block(&mut self, code: &str) -> std::result::Result<u64, String> {
        // Method probes are two-call serial lookups, not batches; they stay
        // functional even when batch evaluation is switched off.
        if code.contains("class_getClassMethod") || code.contains("class_getInstanceMethod") {
            return self.eval_probe(code);
        }
        if self.fail_batches {
            return Err("compound expression evaluation unavailable".to_string());
        }
        if code.contains("char *buffer") {
            return self.eval_string_batch(code);
        }
        if code.contains("void **info") {
            return self.eval_word_batch(code);
        }
        if code.contains("unsigned char *results") {
            return self.eval_byte_batch(code);
        }
        Err(format!("unrecognized block: {code}"))
    }

    fn eval_probe(&mut self, code: &str) -> std::result::Result<u64, String> {
        let re = Regex::new(r#"@\\?"([^"]*)""#).unwrap();
        let mut names = re.captures_iter(code).map(|c| c[1].to_string());
        let class_name = names.next().ok_or("probe missing class")?;
        let selector = names.next().ok_or("probe missing selector")?;

        let Some(&class_ptr) = self.classes.get(&class_name) else {
            return Ok(0);
        };
        let owner = if code.contains("class_getClassMethod") {
            self.metaclasses[&class_ptr]
        } else {
            class_ptr
        };
        let sel = self.intern_selector(&selector);
        Ok(self.find_method(owner, sel).unwrap_or(0))
    }

    fn eval_string_batch(&mut self, code: &str) -> std::result::Result<u64, String> {
        let count_re = Regex::new(r"offsets\[(\d+)\] = current_offset").unwrap();
        let n: usize = count_re
            .captures_iter(code)
            .last()
            .ok_or("string batch missing terminator")?[1]
            .parse()
            .unwrap();

        let mut strings: Vec<Option<String>> = Vec::with_capacity(n);
        for i in 0..n {
            let item_re = Regex::new(&format!(r"const char \*name_{i} = (.+);")).unwrap();
            let Some(caps) = item_re.captures(code) else {
                strings.push(None);
                continue;
            };
            let ptr = self.eval(&caps[1])?;
            strings.push(if ptr == 0 {
                None
            } else {
                self.read_cstring_at(ptr, usize::MAX)
            });
        }

        let refs: Vec<Option<&str>> = strings.iter().map(Option::as_deref).collect();
        Ok(self.alloc_region(buffer::encode_contiguous(&refs), true))
    }

    fn eval_word_batch(&mut self, code: &str) -> std::result::Result<u64, String> {
        let slot_re = Regex::new(r"info\[(\d+)\] = \(void \*\)(.+);").unwrap();
        let mut slots: BTreeMap<usize, u64> = BTreeMap::new();
        for caps in slot_re.captures_iter(code) {
            let index: usize = caps[1].parse().unwrap();
            let rhs = &caps[2];
            let value = if rhs == "0" {
                0
            } else {
                // The right-hand side is the item expression in parentheses.
                self.eval(&rhs[1..rhs.len() - 1])?
            };
            slots.insert(index, value);
        }
        let mut bytes = Vec::with_capacity(slots.len() * 8);
        for value in slots.values() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Ok(self.alloc_region(bytes, true))
    }

    fn eval_byte_batch(&mut self, code: &str) -> std::result::Result<u64, String> {
        let slot_re = Regex::new(r"results\[(\d+)\] = (.+);").unwrap();
        let mut slots: BTreeMap<usize, u8> = BTreeMap::new();
        for caps in slot_re.captures_iter(code) {
            let index: usize = caps[1].parse().unwrap();
            let rhs = &caps[2];
            let value = if rhs == "0" {
                0
            } else {
                let inner = rhs
                    .strip_prefix("(unsigned char)(")
                    .and_then(|r| r.strip_suffix(')'))
                    .ok_or("malformed byte slot")?;
                (self.eval(inner)? != 0) as u8
            };
            slots.insert(index, value);
        }
        Ok(self.alloc_region(slots.into_values().collect(), true))
    }
}

fn hex_after(code: &str, marker: &str) -> Option<u64> {
    let start = code.find(marker)? + marker.len();
    let rest = &code[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(rest.len());
    u64::from_str_radix(&rest[..end], 16).ok()
}

fn quoted(code: &str) -> Option<String> {
    let re = Regex::new(r#"@"((?:[^"\\]|\\.)*)""#).unwrap();
    let raw = re.captures(code)?[1].to_string();
    Some(raw.replace("\\\"", "\"").replace("\\\\", "\\"))
}

fn cstr_arg(code: &str) -> Option<String> {
    let re = Regex::new(r#"\("((?:[^"\\]|\\.)*)"\)"#).unwrap();
    let raw = re.captures(code)?[1].to_string();
    Some(raw.replace("\\\"", "\"").replace("\\\\", "\\"))
}

impl RemoteBridge for FakeRuntime {
    fn evaluate(&self, code: &str) -> Result<u64> {
        let mut inner = self.inner.borrow_mut();
        inner.eval_count += 1;
        inner
            .eval(code)
            .map_err(|message| Error::remote("evaluate", message))
    }

    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut inner = self.inner.borrow_mut();
        inner.read_count += 1;
        inner
            .read_bytes(address, len)
            .ok_or_else(|| Error::remote("read_memory", format!("unmapped read 0x{address:x}+{len}")))
    }

    fn read_cstring(&self, address: u64, max_len: usize) -> Result<String> {
        let mut inner = self.inner.borrow_mut();
        inner.read_count += 1;
        inner
            .read_cstring_at(address, max_len)
            .ok_or_else(|| Error::remote("read_cstring", format!("unmapped string 0x{address:x}")))
    }

    fn resolve_symbol(&self, address: u64) -> Option<String> {
        self.inner.borrow().symbols.get(&address).cloned()
    }

    fn pointer_width(&self) -> PointerWidth {
        PointerWidth::Eight
    }

    fn process_id(&self) -> u64 {
        self.pid
    }
}
