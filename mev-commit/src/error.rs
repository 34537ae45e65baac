//! Errors raised while building or querying the event registry.

/// Errors returned by [`crate::EventRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No registered event has this name, signature or topic.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Two definitions share a name.
    #[error("event `{0}` is registered twice")]
    DuplicateEvent(String),

    /// Two definitions share a canonical signature.
    #[error("signature `{0}` is registered twice")]
    DuplicateSignature(String),

    /// The signature is not a valid Solidity event declaration.
    #[error("invalid event signature `{signature}`: {reason}")]
    InvalidSignature {
        /// The offending signature.
        signature: String,
        /// Parser message.
        reason: String,
    },
}
