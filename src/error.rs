//! Error types for the notify-utils primitives.

use snafu::Snafu;

/// Errors from the sealed-value and context-local primitives.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum UtilsError {
    /// A lazy getter's factory produced a value of the wrong concrete type.
    ///
    /// The expected type must match exactly; substitutes with a compatible
    /// interface are rejected rather than silently accepted.
    #[snafu(display("factory produced a value that is not a '{expected}'"))]
    FactoryTypeMismatch {
        /// Name of the type the getter was declared with.
        expected: &'static str,
    },

    /// A sealed value was constructed with an invalid argument combination.
    #[snafu(display("invalid sealed value construction: {reason}"))]
    InvalidConstruction {
        /// What was wrong with the arguments.
        reason: &'static str,
    },

    /// No key in the key set could authenticate and decrypt the ciphertext.
    ///
    /// Raised for wrong keys, rotated-out keys, tampered ciphertext, and
    /// malformed framing alike; never retried internally.
    #[snafu(display("decryption failed after trying {keys_tried} key(s)"))]
    DecryptionFailed {
        /// How many keys were attempted before giving up.
        keys_tried: usize,
    },

    /// AEAD encryption failed.
    #[snafu(display("encryption failed: {reason}"))]
    Encryption {
        /// Description of the failure.
        reason: String,
    },

    /// Key material is not the required size.
    #[snafu(display("sealing key must be {expected} bytes, got {length}"))]
    InvalidKeyLength {
        /// Required key size in bytes.
        expected: usize,
        /// Size of the supplied material.
        length: usize,
    },

    /// JSON serialization or deserialization error.
    #[snafu(display("serialization error: {source}"))]
    Serialization {
        /// The underlying error.
        source: serde_json::Error,
    },
}

/// Result type for notify-utils operations.
pub type Result<T, E = UtilsError> = std::result::Result<T, E>;
