//! Type-encoding and property-attribute decoding.
//!
//! The runtime describes types with a compact grammar (`i` = int,
//! `@"NSString"` = object of class NSString, `^{CGPoint=dd}` = pointer to
//! struct CGPoint, ...). The decoder walks it left to right: qualifiers
//! first, then a dispatch on the leading character, recursing for pointer
//! and array element types.

use serde::Serialize;

/// Decode a type-encoding string into a readable type description.
/// Unrecognized encodings come back verbatim rather than failing.
pub fn decode_type_encoding(encoding: &str) -> String {
    if encoding.is_empty() {
        return "?".to_string();
    }

    let (qualifiers, rest) = strip_qualifiers(encoding);
    let decoded = decode_unqualified(rest);

    if qualifiers.is_empty() {
        decoded
    } else {
        format!("{} {}", qualifiers.join(" "), decoded)
    }
}

fn strip_qualifiers(encoding: &str) -> (Vec<&'static str>, &str) {
    let mut qualifiers = Vec::new();
    let mut rest = encoding;
    loop {
        let Some(c) = rest.chars().next() else { break };
        let word = match c {
            'r' => "const",
            'n' => "in",
            'N' => "inout",
            'o' => "out",
            'O' => "bycopy",
            'R' => "byref",
            'V' => "oneway",
            _ => break,
        };
        qualifiers.push(word);
        rest = &rest[1..];
    }
    (qualifiers, rest)
}

fn decode_unqualified(encoding: &str) -> String {
    // Object with a quoted class or protocol name: @"NSString", @"<NSCopying>"
    if let Some(quoted) = encoding.strip_prefix("@\"") {
        let name = quoted.strip_suffix('"').unwrap_or(quoted);
        if let Some(proto) = name.strip_prefix('<').and_then(|n| n.strip_suffix('>')) {
            return format!("id<{proto}>");
        }
        return name.to_string();
    }

    if let Some(primitive) = primitive_type(encoding) {
        return primitive.to_string();
    }

    // Pointer: ^Type
    if let Some(inner) = encoding.strip_prefix('^') {
        return format!("{} *", decode_type_encoding(inner));
    }

    // Array: [countType]
    if let Some(body) = encoding
        .strip_prefix('[')
        .and_then(|b| b.strip_suffix(']').or(Some(b)))
    {
        let digits: String = body.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            let element = decode_type_encoding(&body[digits.len()..]);
            return format!("{element}[{digits}]");
        }
    }

    // Struct: {name=fields}
    if let Some(body) = encoding.strip_prefix('{') {
        if let Some(name) = aggregate_name(body, '}') {
            return format!("struct {name}");
        }
        return encoding.to_string();
    }

    // Union: (name=fields)
    if let Some(body) = encoding.strip_prefix('(') {
        if let Some(name) = aggregate_name(body, ')') {
            return format!("union {name}");
        }
        return encoding.to_string();
    }

    // Bitfield: b<width>
    if let Some(width) = encoding.strip_prefix('b') {
        if !width.is_empty() && width.chars().all(|c| c.is_ascii_digit()) {
            let unit = if width == "1" { "bit" } else { "bits" };
            return format!("{width} {unit}");
        }
    }

    encoding.to_string()
}

fn primitive_type(encoding: &str) -> Option<&'static str> {
    Some(match encoding {
        "c" => "char",
        "i" => "int",
        "s" => "short",
        "l" => "long",
        "q" => "long long",
        "C" => "unsigned char",
        "I" => "unsigned int",
        "S" => "unsigned short",
        "L" => "unsigned long",
        "Q" => "unsigned long long",
        "f" => "float",
        "d" => "double",
        "B" => "BOOL",
        "v" => "void",
        "*" => "char *",
        "@" => "id",
        "@?" => "block",
        "#" => "Class",
        ":" => "SEL",
        "?" => "?",
        _ => return None,
    })
}

fn aggregate_name(body: &str, close: char) -> Option<&str> {
    // The name runs to '=' when fields are spelled out, else to the closer.
    let end = body.find('=').or_else(|| body.find(close))?;
    Some(&body[..end])
}

/// Decoded property attribute string.
///
/// Raw form is comma-delimited: `T@"NSString",R,N,V_name`. Unrecognized
/// tokens are skipped, never fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyAttributes {
    pub decoded_type: String,
    pub readonly: bool,
    pub copy: bool,
    pub strong: bool,
    pub nonatomic: bool,
    pub dynamic: bool,
    pub weak: bool,
    pub getter: Option<String>,
    pub setter: Option<String>,
    pub backing_ivar: Option<String>,
}

impl PropertyAttributes {
    /// Attribute words in declaration-ish order, for display.
    pub fn words(&self) -> Vec<String> {
        let mut words = Vec::new();
        if self.readonly {
            words.push("readonly".to_string());
        }
        if self.copy {
            words.push("copy".to_string());
        }
        if self.strong {
            words.push("strong".to_string());
        }
        if self.nonatomic {
            words.push("nonatomic".to_string());
        }
        if self.dynamic {
            words.push("dynamic".to_string());
        }
        if self.weak {
            words.push("weak".to_string());
        }
        if let Some(g) = &self.getter {
            words.push(format!("getter={g}"));
        }
        if let Some(s) = &self.setter {
            words.push(format!("setter={s}"));
        }
        words
    }
}

pub fn parse_property_attributes(raw: &str) -> PropertyAttributes {
    let mut attrs = PropertyAttributes {
        decoded_type: "?".to_string(),
        ..Default::default()
    };

    for part in raw.split(',') {
        if part.is_empty() {
            continue;
        }
        if let Some(enc) = part.strip_prefix('T') {
            attrs.decoded_type = decode_type_encoding(enc);
        } else if let Some(name) = part.strip_prefix('V') {
            attrs.backing_ivar = Some(name.to_string());
        } else if let Some(name) = part.strip_prefix('G') {
            attrs.getter = Some(name.to_string());
        } else if let Some(name) = part.strip_prefix('S') {
            attrs.setter = Some(name.to_string());
        } else {
            match part {
                "R" => attrs.readonly = true,
                "C" => attrs.copy = true,
                "&" => attrs.strong = true,
                "N" => attrs.nonatomic = true,
                "D" => attrs.dynamic = true,
                "W" => attrs.weak = true,
                _ => {} // unknown token, ignore
            }
        }
    }

    attrs
}
