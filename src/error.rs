use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("REMOTE_CALL_FAILED: {step}: {message}")]
    RemoteCall { step: &'static str, message: String },

    #[error("CLASS_NOT_FOUND: No class named '{0}' is registered with the runtime.")]
    ClassNotFound(String),

    #[error("SELECTOR_NOT_FOUND: Selector '{0}' is not registered with the runtime.")]
    SelectorNotFound(String),

    #[error("PROTOCOL_NOT_FOUND: No protocol named '{0}' is registered with the runtime.")]
    ProtocolNotFound(String),

    #[error("NO_IMPLEMENTATION: {kind} method '{selector}' has no implementation anywhere in the hierarchy of '{class}'.")]
    NoImplementation {
        class: String,
        selector: String,
        kind: &'static str,
    },

    #[error("FORWARDING_STUB: {kind} method '{selector}' on '{class}' resolves to the runtime forwarding stub ({symbol}). Refusing: it would fire on every unhandled message.")]
    ForwardingUnimplemented {
        class: String,
        selector: String,
        kind: &'static str,
        symbol: String,
    },

    #[error("MALFORMED_BUFFER: {0}")]
    MalformedBuffer(String),

    #[error("INVALID_SIGNATURE: {0}")]
    InvalidSignature(String),
}

impl Error {
    /// Wrap a bridge failure with the name of the step that issued it.
    pub fn remote(step: &'static str, message: impl Into<String>) -> Self {
        Error::RemoteCall {
            step,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
