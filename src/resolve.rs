//! Method resolution: (class, selector, kind) to an implementation address,
//! classified as direct, inherited, or forwarding-unimplemented.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::{expr, RemoteBridge};

/// Substring identifying the runtime's generic forwarding stub in symbol
/// names (`_objc_msgForward` and friends). A method resolving there has no
/// concrete implementation anywhere in the hierarchy.
pub const FORWARDING_MARKER: &str = "msgForward";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    Instance,
    Class,
}

impl MethodKind {
    pub fn prefix(self) -> char {
        match self {
            MethodKind::Instance => '-',
            MethodKind::Class => '+',
        }
    }

    pub fn word(self) -> &'static str {
        match self {
            MethodKind::Instance => "instance",
            MethodKind::Class => "class",
        }
    }
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.word())
    }
}

/// Where a resolved implementation actually lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Provenance {
    Direct,
    /// The implementation is an ancestor's; the requested class never
    /// overrides the selector.
    InheritedFrom(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    pub class_pointer: u64,
    pub selector_pointer: u64,
    pub address: u64,
    pub symbol: Option<String>,
    pub provenance: Provenance,
}

/// Outcome of the explicit instance-vs-class dispatch probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchProbe {
    ClassMethod,
    InstanceMethod,
    UnknownDefaultsToInstance,
}

impl DispatchProbe {
    pub fn kind(self) -> MethodKind {
        match self {
            DispatchProbe::ClassMethod => MethodKind::Class,
            DispatchProbe::InstanceMethod | DispatchProbe::UnknownDefaultsToInstance => {
                MethodKind::Instance
            }
        }
    }
}

/// A method symbol taken apart: `-[ClassName(Category) selector]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSymbol {
    pub kind: MethodKind,
    pub class: String,
    pub category: Option<String>,
    pub selector: String,
}

fn symbol_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Heuristic: depends on the runtime's stable [+-][Class(Category) sel]
    // symbol-naming convention. Anything else is treated as unparseable.
    RE.get_or_init(|| Regex::new(r"^([+-])\[(\w+)(?:\((\w+)\))?\s+(.+)\]$").unwrap())
}

/// Parse an implementation symbol name. Returns None for symbols that do not
/// follow the method-naming convention (C functions, stubs, thunks).
pub fn parse_method_symbol(symbol: &str) -> Option<ParsedSymbol> {
    let caps = symbol_regex().captures(symbol)?;
    Some(ParsedSymbol {
        kind: if &caps[1] == "-" {
            MethodKind::Instance
        } else {
            MethodKind::Class
        },
        class: caps[2].to_string(),
        category: caps.get(3).map(|m| m.as_str().to_string()),
        selector: caps[4].to_string(),
    })
}

/// Parse a user-facing method signature: `-[Class selector:]`,
/// `+[Class selector:]`, or `[Class selector:]` (kind to be probed).
pub fn parse_method_signature(input: &str) -> Result<(Option<MethodKind>, String, String)> {
    let input = input.trim();
    let (kind, rest) = if let Some(rest) = input.strip_prefix("-[") {
        (Some(MethodKind::Instance), rest)
    } else if let Some(rest) = input.strip_prefix("+[") {
        (Some(MethodKind::Class), rest)
    } else if let Some(rest) = input.strip_prefix('[') {
        (None, rest)
    } else {
        return Err(Error::InvalidSignature(
            "expected -[Class selector:], +[Class selector:], or [Class selector:]".to_string(),
        ));
    };

    let body = rest.strip_suffix(']').unwrap_or(rest);
    let mut parts = body.splitn(2, char::is_whitespace);
    let (Some(class), Some(selector)) = (parts.next(), parts.next()) else {
        return Err(Error::InvalidSignature(
            "expected: [ClassName selector:]".to_string(),
        ));
    };
    let selector = selector.trim();
    if class.is_empty() || selector.is_empty() {
        return Err(Error::InvalidSignature(
            "expected: [ClassName selector:]".to_string(),
        ));
    }
    Ok((kind, class.to_string(), selector.to_string()))
}

pub struct MethodResolver<'a> {
    bridge: &'a dyn RemoteBridge,
}

impl<'a> MethodResolver<'a> {
    pub fn new(bridge: &'a dyn RemoteBridge) -> Self {
        Self { bridge }
    }

    /// Resolve a method to its implementation address.
    ///
    /// Each step short-circuits with a step-named error. A successful lookup
    /// is classified from the symbol at the address: the forwarding stub is
    /// surfaced as an error (acting on it would fire on every unhandled
    /// message); a symbol naming a different class with the same selector
    /// becomes an `InheritedFrom` annotation.
    pub fn resolve(
        &self,
        class_name: &str,
        selector: &str,
        kind: MethodKind,
    ) -> Result<ResolvedMethod> {
        let class_pointer = self
            .bridge
            .evaluate(&expr::class_from_name(class_name))
            .map_err(|e| Error::remote("resolve_class", e.to_string()))?;
        if class_pointer == 0 {
            return Err(Error::ClassNotFound(class_name.to_string()));
        }

        let selector_pointer = self
            .bridge
            .evaluate(&expr::selector_from_name(selector))
            .map_err(|e| Error::remote("resolve_selector", e.to_string()))?;
        if selector_pointer == 0 {
            return Err(Error::SelectorNotFound(selector.to_string()));
        }

        // Class methods live on the metaclass.
        let lookup_pointer = match kind {
            MethodKind::Instance => class_pointer,
            MethodKind::Class => self
                .bridge
                .evaluate(&expr::metaclass(class_pointer))
                .map_err(|e| Error::remote("resolve_metaclass", e.to_string()))?,
        };

        let address = self
            .bridge
            .evaluate(&expr::method_implementation(lookup_pointer, selector_pointer))
            .map_err(|e| Error::remote("resolve_implementation", e.to_string()))?;
        if address == 0 {
            return Err(Error::NoImplementation {
                class: class_name.to_string(),
                selector: selector.to_string(),
                kind: kind.word(),
            });
        }

        let symbol = self.bridge.resolve_symbol(address);
        let provenance = match &symbol {
            Some(name) if name.contains(FORWARDING_MARKER) => {
                return Err(Error::ForwardingUnimplemented {
                    class: class_name.to_string(),
                    selector: selector.to_string(),
                    kind: kind.word(),
                    symbol: name.clone(),
                });
            }
            Some(name) => match parse_method_symbol(name) {
                Some(parsed) if parsed.class != class_name && parsed.selector == selector => {
                    Provenance::InheritedFrom(parsed.class)
                }
                _ => Provenance::Direct,
            },
            None => Provenance::Direct,
        };

        Ok(ResolvedMethod {
            class_pointer,
            selector_pointer,
            address,
            symbol,
            provenance,
        })
    }

    /// Explicit two-step probe for a bare `[Class selector]` signature:
    /// class side first, then instance side, defaulting to instance when
    /// neither probe finds a method.
    pub fn detect_dispatch_kind(&self, class_name: &str, selector: &str) -> Result<DispatchProbe> {
        let class_side = self
            .bridge
            .evaluate(&expr::class_method_probe(class_name, selector))
            .unwrap_or(0);
        if class_side != 0 {
            return Ok(DispatchProbe::ClassMethod);
        }

        let instance_side = self
            .bridge
            .evaluate(&expr::instance_method_probe(class_name, selector))
            .unwrap_or(0);
        if instance_side != 0 {
            return Ok(DispatchProbe::InstanceMethod);
        }

        Ok(DispatchProbe::UnknownDefaultsToInstance)
    }
}
