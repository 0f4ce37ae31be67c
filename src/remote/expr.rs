//! Builders for the Objective-C expression snippets evaluated in the target.
//!
//! Everything here produces plain strings; the bridge treats them as opaque
//! code. Compound batch blocks use the `(^{ ... }())` block-call form because
//! debugger expression parsers generally reject GCC statement expressions.

/// Escape a name for embedding inside a quoted literal in target code.
pub fn escape_literal(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn malloc_count_cell() -> String {
    "(unsigned int *)malloc(sizeof(unsigned int))".to_string()
}

pub fn read_count_cell(cell: u64) -> String {
    format!("(unsigned int)(*(unsigned int *)0x{cell:x})")
}

pub fn free(address: u64) -> String {
    format!("(void)free((void *)0x{address:x})")
}

pub fn copy_class_list(count_cell: u64) -> String {
    format!("(void *)objc_copyClassList((unsigned int *)0x{count_cell:x})")
}

pub fn copy_protocol_list(count_cell: u64) -> String {
    format!("(void *)objc_copyProtocolList((unsigned int *)0x{count_cell:x})")
}

pub fn copy_method_list(class_ptr: u64, count_cell: u64) -> String {
    format!("(void *)class_copyMethodList((Class)0x{class_ptr:x}, (unsigned int *)0x{count_cell:x})")
}

pub fn copy_ivar_list(class_ptr: u64, count_cell: u64) -> String {
    format!("(void *)class_copyIvarList((Class)0x{class_ptr:x}, (unsigned int *)0x{count_cell:x})")
}

pub fn copy_property_list(class_ptr: u64, count_cell: u64) -> String {
    format!(
        "(void *)class_copyPropertyList((Class)0x{class_ptr:x}, (unsigned int *)0x{count_cell:x})"
    )
}

pub fn class_from_name(name: &str) -> String {
    format!("(void *)NSClassFromString(@\"{}\")", escape_literal(name))
}

pub fn selector_from_name(name: &str) -> String {
    format!("(SEL)NSSelectorFromString(@\"{}\")", escape_literal(name))
}

pub fn protocol_from_name(name: &str) -> String {
    format!("(void *)objc_getProtocol(\"{}\")", escape_literal(name))
}

pub fn class_name(class_ptr: u64) -> String {
    format!("(const char *)class_getName((Class)0x{class_ptr:x})")
}

pub fn protocol_name(proto_ptr: u64) -> String {
    format!("(const char *)protocol_getName((void *)0x{proto_ptr:x})")
}

pub fn metaclass(class_ptr: u64) -> String {
    format!("(Class)object_getClass((id)0x{class_ptr:x})")
}

pub fn superclass(class_ptr: u64) -> String {
    format!("(void *)class_getSuperclass((Class)0x{class_ptr:x})")
}

pub fn image_name(class_ptr: u64) -> String {
    format!("(const char *)class_getImageName((Class)0x{class_ptr:x})")
}

pub fn method_implementation(class_ptr: u64, sel_ptr: u64) -> String {
    format!("(void *)class_getMethodImplementation((Class)0x{class_ptr:x}, (SEL)0x{sel_ptr:x})")
}

pub fn selector_name_of_method(method_ptr: u64) -> String {
    format!("(const char *)sel_getName((SEL)method_getName((void *)0x{method_ptr:x}))")
}

pub fn implementation_of_method(method_ptr: u64) -> String {
    format!("(void *)method_getImplementation((void *)0x{method_ptr:x})")
}

pub fn ivar_name(ivar_ptr: u64) -> String {
    format!("(const char *)ivar_getName((void *)0x{ivar_ptr:x})")
}

pub fn ivar_type_encoding(ivar_ptr: u64) -> String {
    format!("(const char *)ivar_getTypeEncoding((void *)0x{ivar_ptr:x})")
}

pub fn ivar_offset(ivar_ptr: u64) -> String {
    format!("(ptrdiff_t)ivar_getOffset((void *)0x{ivar_ptr:x})")
}

pub fn property_name(prop_ptr: u64) -> String {
    format!("(const char *)property_getName((void *)0x{prop_ptr:x})")
}

pub fn property_attributes(prop_ptr: u64) -> String {
    format!("(const char *)property_getAttributes((void *)0x{prop_ptr:x})")
}

pub fn conforms_to_protocol(class_ptr: u64, proto_ptr: u64) -> String {
    format!("(BOOL)class_conformsToProtocol((Class)0x{class_ptr:x}, (void *)0x{proto_ptr:x})")
}

/// Probe for a class-side method; yields the Method pointer or 0.
pub fn class_method_probe(class_name: &str, selector: &str) -> String {
    method_probe(class_name, selector, "class_getClassMethod")
}

/// Probe for an instance-side method; yields the Method pointer or 0.
pub fn instance_method_probe(class_name: &str, selector: &str) -> String {
    method_probe(class_name, selector, "class_getInstanceMethod")
}

fn method_probe(class_name: &str, selector: &str, getter: &str) -> String {
    format!(
        "(void *)(^{{\n    Class cls = (Class)NSClassFromString(@\"{}\");\n    if (!cls) return (void *)0;\n    SEL sel = (SEL)NSSelectorFromString(@\"{}\");\n    return (void *){}(cls, sel);\n}}())",
        escape_literal(class_name),
        escape_literal(selector),
        getter
    )
}

/// Average bytes reserved per item in a consolidated string heap.
const HEAP_ESTIMATE_PER_ITEM: usize = 40;

/// Build the compound expression that resolves many C-string lookups into one
/// consolidated buffer: an offset table of N+1 u32s followed by a string heap.
///
/// `items[i]` is the per-item `const char *` expression, or None for a slot
/// that is absent up front (null handle). Absent slots and strings that do
/// not fit the heap get the 0xFFFFFFFF sentinel; the final offset slot holds
/// the total heap length. The block returns the buffer address (or 0 if the
/// target-side malloc fails).
pub fn string_batch_block(items: &[Option<String>]) -> String {
    let n = items.len();
    let table_size = (n + 1) * 4;
    let heap_size = HEAP_ESTIMATE_PER_ITEM * n;
    let buffer_size = table_size + heap_size;

    let mut block = format!(
        "(void *)(^{{\n    char *buffer = (char *)malloc({buffer_size});\n    if (!buffer) return (void *)0;\n    unsigned int *offsets = (unsigned int *)buffer;\n    char *string_data = buffer + {table_size};\n    unsigned int current_offset = 0;\n"
    );

    for (i, item) in items.iter().enumerate() {
        match item {
            Some(expr) => {
                block.push_str(&format!(
                    "    {{\n        const char *name_{i} = {expr};\n        offsets[{i}] = 0xFFFFFFFF;\n        if (name_{i}) {{\n            unsigned long len = (unsigned long)strlen(name_{i}) + 1;\n            if (current_offset + len <= {heap_size}) {{\n                offsets[{i}] = current_offset;\n                (void)memcpy(string_data + current_offset, name_{i}, len);\n                current_offset += len;\n            }}\n        }}\n    }}\n"
                ));
            }
            None => {
                block.push_str(&format!("    offsets[{i}] = 0xFFFFFFFF;\n"));
            }
        }
    }

    block.push_str(&format!(
        "    offsets[{n}] = current_offset;\n    return (void *)buffer;\n}}())"
    ));
    block
}

/// Build the compound expression that evaluates `width` pointer-sized values
/// per item into one malloc'd array read back in a single memory read.
///
/// `items[i]` holds the per-slot expressions for item i (each cast to
/// `void *` by the block), or None for an absent item whose slots are zeroed.
pub fn word_batch_block(items: &[Option<Vec<String>>], width: usize) -> String {
    let n = items.len();
    let mut block = format!(
        "(void *)(^{{\n    void **info = (void **)malloc({n} * {width} * sizeof(void *));\n    if (!info) return (void *)0;\n"
    );

    for (i, item) in items.iter().enumerate() {
        match item {
            Some(exprs) => {
                debug_assert_eq!(exprs.len(), width);
                for (j, expr) in exprs.iter().enumerate() {
                    block.push_str(&format!("    info[{}] = (void *)({expr});\n", i * width + j));
                }
            }
            None => {
                for j in 0..width {
                    block.push_str(&format!("    info[{}] = (void *)0;\n", i * width + j));
                }
            }
        }
    }

    block.push_str("    return (void *)info;\n}())");
    block
}

/// Build the compound expression that evaluates one boolean per item into a
/// malloc'd byte array.
pub fn byte_batch_block(items: &[Option<String>]) -> String {
    let n = items.len();
    let mut block = format!(
        "(void *)(^{{\n    unsigned char *results = (unsigned char *)malloc({n});\n    if (!results) return (void *)0;\n"
    );

    for (i, item) in items.iter().enumerate() {
        match item {
            Some(expr) => {
                block.push_str(&format!("    results[{i}] = (unsigned char)({expr});\n"));
            }
            None => {
                block.push_str(&format!("    results[{i}] = 0;\n"));
            }
        }
    }

    block.push_str("    return (void *)results;\n}())");
    block
}
