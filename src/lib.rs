pub mod cache;
pub mod catalog;
pub mod config;
pub mod encoding;
pub mod error;
pub mod inspector;
pub mod pattern;
pub mod remote;
pub mod resolve;

pub use error::{Error, Result};
pub use inspector::Inspector;
pub use remote::{PointerWidth, RemoteBridge};
