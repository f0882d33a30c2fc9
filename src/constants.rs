//! Fixed bounds and defaults for the notify-utils primitives.

use std::time::Duration;

/// Sealing key size in bytes (XChaCha20-Poly1305).
pub const SEALING_KEY_SIZE: usize = 32;

/// Nonce size in bytes for XChaCha20-Poly1305.
pub const SEALING_NONCE_SIZE: usize = 24;

/// Framing prefix for sealed ciphertext: `sealed:v1:<base64-data>`.
pub const SEALED_CIPHERTEXT_PREFIX: &str = "sealed:v1:";

/// Domain-separation string for deriving sealing keys from the application
/// secret, so the raw secret is never reused as key material elsewhere.
pub const SEALING_KEY_DOMAIN: &[u8] = b"notify-utils sealed value v1";

/// Maximum plaintext size accepted for sealing (1 MiB).
///
/// Bounds memory held during encrypt/decrypt of a single value.
pub const MAX_SEALED_PLAINTEXT_SIZE: usize = 1024 * 1024;

/// Default number of connection slots a worker starts with.
pub const DEFAULT_INITIAL_POOL_SIZE: usize = 4;

/// Default hard ceiling on connection slots.
///
/// Capacity grows one slot at a time and never past this bound.
pub const DEFAULT_MAX_POOL_SIZE: usize = 256;

/// Default minimum elapsed time between successive pool expansions.
pub const DEFAULT_EXPANSION_COOLDOWN: Duration = Duration::from_secs(5);

/// Default lower bound on the pre-accept wait.
///
/// A non-zero value forces every accept to pause briefly for a slot to
/// free up, biasing connections toward workers with spare capacity.
pub const DEFAULT_EXPANSION_MIN_WAIT: Duration = Duration::from_millis(100);

/// Default budget for handling a single connection.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);
