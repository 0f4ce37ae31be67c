pub mod classes;
pub mod members;
pub mod methods;
pub mod protocols;

pub use classes::{ClassCatalog, ClassHandle, ClassList};
pub use members::{IvarDescriptor, MemberCatalog, PropertyDescriptor};
pub use methods::{MethodCatalog, MethodDescriptor, MethodList};
pub use protocols::{ConformanceGroup, ConformingClass, ProtocolCatalog, ProtocolHandle};
