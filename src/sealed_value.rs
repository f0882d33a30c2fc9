//! Tamper-evident sealed values with key rotation.
//!
//! A [`SealedValue`] holds a JSON-serializable payload as authenticated
//! ciphertext and nothing else. The payload is recoverable only through
//! [`SealedValue::unsealed`], a scoped decryption: plaintext exists for
//! the duration of the closure and is never cached by the container.
//!
//! Keys are managed as an ordered [`SealingKeySet`]: encryption always
//! uses the primary (first) key, decryption tries each key in order until
//! one authenticates. Rotating a key means prepending the new primary and
//! keeping the old key as a fallback until nothing sealed under it remains.

use std::fmt;

use base64::Engine;
use hmac::Hmac;
use hmac::Mac;
use serde_json::Value;
use sha2::Sha256;
use snafu::ResultExt;

use crate::config::AppConfig;
use crate::constants::MAX_SEALED_PLAINTEXT_SIZE;
use crate::constants::SEALED_CIPHERTEXT_PREFIX;
use crate::constants::SEALING_KEY_DOMAIN;
use crate::constants::SEALING_KEY_SIZE;
use crate::constants::SEALING_NONCE_SIZE;
use crate::error::DecryptionFailedSnafu;
use crate::error::EncryptionSnafu;
use crate::error::InvalidConstructionSnafu;
use crate::error::InvalidKeyLengthSnafu;
use crate::error::Result;
use crate::error::SerializationSnafu;

/// A 32-byte symmetric sealing key (XChaCha20-Poly1305).
#[derive(Clone)]
pub struct SealingKey {
    key: [u8; SEALING_KEY_SIZE],
}

impl SealingKey {
    /// Build a key from exactly [`SEALING_KEY_SIZE`] bytes of material.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SEALING_KEY_SIZE {
            return InvalidKeyLengthSnafu { expected: SEALING_KEY_SIZE, length: bytes.len() }
                .fail();
        }
        let mut key = [0u8; SEALING_KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut key = [0u8; SEALING_KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Derive a key from an application secret.
    ///
    /// HMAC-SHA256 under a fixed domain-separation string, so the raw
    /// secret is never shared with unrelated cryptographic uses.
    pub fn derive(secret: &[u8]) -> Self {
        let mut mac = Hmac::<Sha256>::new_from_slice(SEALING_KEY_DOMAIN)
            .expect("HMAC accepts keys of any length");
        mac.update(secret);
        let digest = mac.finalize().into_bytes();

        let mut key = [0u8; SEALING_KEY_SIZE];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypt with a random nonce, nonce prepended to the ciphertext.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        use chacha20poly1305::XChaCha20Poly1305;
        use chacha20poly1305::aead::Aead;
        use chacha20poly1305::aead::KeyInit;
        use chacha20poly1305::aead::generic_array::GenericArray;
        use rand::RngCore;

        let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&self.key));

        let mut nonce = [0u8; SEALING_NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);
        let nonce_ga = GenericArray::from_slice(&nonce);

        let ciphertext = cipher.encrypt(nonce_ga, plaintext).map_err(|e| {
            EncryptionSnafu { reason: format!("XChaCha20-Poly1305 encryption failed: {e}") }
                .build()
        })?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt nonce-prepended ciphertext. Opaque `None` on any failure so
    /// the key set can try the next key without leaking why this one failed.
    fn decrypt(&self, data: &[u8]) -> Option<Vec<u8>> {
        use chacha20poly1305::XChaCha20Poly1305;
        use chacha20poly1305::aead::Aead;
        use chacha20poly1305::aead::KeyInit;
        use chacha20poly1305::aead::generic_array::GenericArray;

        if data.len() < SEALING_NONCE_SIZE {
            return None;
        }

        let (nonce, ciphertext) = data.split_at(SEALING_NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&self.key));
        let nonce_ga = GenericArray::from_slice(nonce);

        cipher.decrypt(nonce_ga, ciphertext).ok()
    }
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SealingKey(<redacted>)")
    }
}

/// Ordered key list for rotation.
///
/// The first key is the primary and performs all encryption; decryption
/// tries each key in order.
#[derive(Clone, Debug)]
pub struct SealingKeySet {
    keys: Vec<SealingKey>,
}

impl SealingKeySet {
    /// A key set with a single key.
    pub fn new(primary: SealingKey) -> Self {
        Self { keys: vec![primary] }
    }

    /// A key set with rotation fallbacks, tried in the order given.
    pub fn with_fallbacks(primary: SealingKey, fallbacks: Vec<SealingKey>) -> Self {
        let mut keys = vec![primary];
        keys.extend(fallbacks);
        Self { keys }
    }

    /// Build from an ordered list of keys. An empty list is invalid.
    pub fn from_keys(keys: Vec<SealingKey>) -> Result<Self> {
        if keys.is_empty() {
            return InvalidConstructionSnafu { reason: "key set must contain at least one key" }
                .fail();
        }
        Ok(Self { keys })
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; construction forbids an empty set.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.keys[0].encrypt(plaintext)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        for key in &self.keys {
            if let Some(plaintext) = key.decrypt(data) {
                return Ok(plaintext);
            }
        }
        DecryptionFailedSnafu { keys_tried: self.keys.len() }.fail()
    }
}

impl From<SealingKey> for SealingKeySet {
    fn from(key: SealingKey) -> Self {
        Self::new(key)
    }
}

/// An immutable container for authenticated-encrypted JSON payloads.
///
/// The sealed bytes are fixed at construction; there is no mutating
/// method. Display and Debug only ever show a byte-length summary.
pub struct SealedValue {
    sealed: Vec<u8>,
}

impl SealedValue {
    /// Seal a JSON value under the key set's primary key.
    pub fn seal(value: &Value, keys: &SealingKeySet) -> Result<Self> {
        // serde_json's default encoding is the compact form: no extraneous
        // whitespace, object key order preserved from input
        let plaintext = serde_json::to_vec(value).context(SerializationSnafu)?;
        if plaintext.len() > MAX_SEALED_PLAINTEXT_SIZE {
            return EncryptionSnafu {
                reason: format!(
                    "plaintext of {} bytes exceeds maximum of {} bytes",
                    plaintext.len(),
                    MAX_SEALED_PLAINTEXT_SIZE
                ),
            }
            .fail();
        }

        let ciphertext = keys.encrypt(&plaintext)?;
        let framed = format!(
            "{}{}",
            SEALED_CIPHERTEXT_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(&ciphertext)
        );
        Ok(Self { sealed: framed.into_bytes() })
    }

    /// Load previously-sealed bytes verbatim.
    ///
    /// No validation happens here; a bad payload surfaces on unseal.
    pub fn from_sealed(sealed: impl Into<Vec<u8>>) -> Self {
        Self { sealed: sealed.into() }
    }

    /// Optional-argument construction: exactly one of `value` or
    /// `load_sealed` must be supplied.
    pub fn from_parts(
        value: Option<&Value>,
        load_sealed: Option<Vec<u8>>,
        keys: &SealingKeySet,
    ) -> Result<Self> {
        match (value, load_sealed) {
            (Some(_), Some(_)) => InvalidConstructionSnafu {
                reason: "cannot specify both value and load_sealed",
            }
            .fail(),
            (Some(value), None) => Self::seal(value, keys),
            (None, Some(sealed)) => Ok(Self::from_sealed(sealed)),
            (None, None) => InvalidConstructionSnafu {
                reason: "must specify either value or load_sealed",
            }
            .fail(),
        }
    }

    /// Decrypt and parse the payload for the duration of the closure.
    ///
    /// The plaintext is dropped when the closure returns; the container
    /// retains only ciphertext. Fails with
    /// [`crate::error::UtilsError::DecryptionFailed`] if no key in the
    /// set authenticates the ciphertext, or if the framing is malformed.
    pub fn unsealed<R>(
        &self,
        keys: &SealingKeySet,
        scope: impl FnOnce(&Value) -> R,
    ) -> Result<R> {
        let ciphertext = self.parse_framing(keys.len())?;
        let plaintext = keys.decrypt(&ciphertext)?;
        let value: Value = serde_json::from_slice(&plaintext).context(SerializationSnafu)?;
        Ok(scope(&value))
    }

    /// The raw sealed bytes, suitable for storage or transport.
    pub fn dump_sealed(&self) -> &[u8] {
        &self.sealed
    }

    /// Size of the sealed bytes.
    pub fn len(&self) -> usize {
        self.sealed.len()
    }

    /// True if the sealed byte string is empty (only possible via
    /// [`Self::from_sealed`]; unsealing such a value fails).
    pub fn is_empty(&self) -> bool {
        self.sealed.is_empty()
    }

    /// Strip and validate the `sealed:v1:` framing.
    fn parse_framing(&self, keys_in_set: usize) -> Result<Vec<u8>> {
        let framed = std::str::from_utf8(&self.sealed)
            .ok()
            .and_then(|s| s.strip_prefix(SEALED_CIPHERTEXT_PREFIX));

        let b64_data = match framed {
            Some(data) => data,
            None => return DecryptionFailedSnafu { keys_tried: keys_in_set }.fail(),
        };

        base64::engine::general_purpose::STANDARD
            .decode(b64_data)
            .map_err(|_| DecryptionFailedSnafu { keys_tried: keys_in_set }.build())
    }
}

impl fmt::Display for SealedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedValue(<{}B sealed data>)", self.sealed.len())
    }
}

impl fmt::Debug for SealedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Sealing bound to the ambient application configuration.
///
/// Derives its key set once at construction: the dedicated sealing secret
/// if configured, else the application secret, with retired secrets as
/// rotation fallbacks. Callers then seal and unseal without passing keys.
pub struct AppSealer {
    keys: SealingKeySet,
}

impl AppSealer {
    /// Build a sealer from application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let primary_secret = config
            .sealing
            .sealed_value_secret_key
            .as_deref()
            .unwrap_or(&config.sealing.secret_key);

        let fallbacks = config
            .sealing
            .retired_secret_keys
            .iter()
            .map(|secret| SealingKey::derive(secret.as_bytes()))
            .collect();

        Self {
            keys: SealingKeySet::with_fallbacks(
                SealingKey::derive(primary_secret.as_bytes()),
                fallbacks,
            ),
        }
    }

    /// Seal a JSON value under the configured primary key.
    pub fn seal(&self, value: &Value) -> Result<SealedValue> {
        SealedValue::seal(value, &self.keys)
    }

    /// Optional-argument construction against the configured keys; the
    /// both/neither rule of [`SealedValue::from_parts`] applies.
    pub fn load(&self, value: Option<&Value>, load_sealed: Option<Vec<u8>>) -> Result<SealedValue> {
        SealedValue::from_parts(value, load_sealed, &self.keys)
    }

    /// Scoped decryption with the configured keys.
    pub fn unsealed<R>(&self, sealed: &SealedValue, scope: impl FnOnce(&Value) -> R) -> Result<R> {
        sealed.unsealed(&self.keys, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UtilsError;
    use serde_json::json;

    #[test]
    fn test_seal_unseal_round_trip() {
        let keys = SealingKeySet::new(SealingKey::generate());
        let value = json!({"user_id": 42, "role": "admin", "tags": ["a", "b"], "extra": null});

        let sealed = SealedValue::seal(&value, &keys).unwrap();
        let recovered = sealed.unsealed(&keys, |v| v.clone()).unwrap();

        assert_eq!(recovered, value);
    }

    #[test]
    fn test_dump_and_reload_round_trip() {
        let keys = SealingKeySet::new(SealingKey::generate());
        let value = json!({"user_id": 42, "role": "admin"});

        let sealed = SealedValue::seal(&value, &keys).unwrap();
        let bytes = sealed.dump_sealed().to_vec();

        let reloaded = SealedValue::from_sealed(bytes);
        let recovered = reloaded.unsealed(&keys, |v| v.clone()).unwrap();
        assert_eq!(recovered, value);
    }

    #[test]
    fn test_wrong_key_fails_decryption() {
        let keys = SealingKeySet::new(SealingKey::generate());
        let unrelated = SealingKeySet::new(SealingKey::generate());

        let sealed = SealedValue::seal(&json!({"user_id": 42}), &keys).unwrap();
        let err = sealed.unsealed(&unrelated, |v| v.clone()).unwrap_err();

        assert!(matches!(err, UtilsError::DecryptionFailed { keys_tried: 1 }));
    }

    #[test]
    fn test_rotated_key_set_still_decrypts() {
        let old_key = SealingKey::generate();
        let old_set = SealingKeySet::new(old_key.clone());
        let sealed = SealedValue::seal(&json!(["payload"]), &old_set).unwrap();

        // Rotate: new primary, old key kept as fallback
        let rotated = SealingKeySet::with_fallbacks(SealingKey::generate(), vec![old_key]);
        let recovered = sealed.unsealed(&rotated, |v| v.clone()).unwrap();
        assert_eq!(recovered, json!(["payload"]));

        // New seals use the new primary, which the old set cannot read
        let resealed = SealedValue::seal(&json!(["payload"]), &rotated).unwrap();
        assert!(resealed.unsealed(&old_set, |v| v.clone()).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let keys = SealingKeySet::new(SealingKey::generate());
        let sealed = SealedValue::seal(&json!({"user_id": 42}), &keys).unwrap();

        let mut bytes = sealed.dump_sealed().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = SealedValue::from_sealed(bytes);

        assert!(matches!(
            tampered.unsealed(&keys, |v| v.clone()),
            Err(UtilsError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_malformed_framing_rejected() {
        let keys = SealingKeySet::new(SealingKey::generate());

        let no_prefix = SealedValue::from_sealed(b"not a sealed value".to_vec());
        assert!(no_prefix.unsealed(&keys, |v| v.clone()).is_err());

        let bad_base64 = SealedValue::from_sealed(b"sealed:v1:!!!not-base64!!!".to_vec());
        assert!(bad_base64.unsealed(&keys, |v| v.clone()).is_err());
    }

    #[test]
    fn test_failed_unseal_leaves_sealed_bytes_unchanged() {
        let keys = SealingKeySet::new(SealingKey::generate());
        let unrelated = SealingKeySet::new(SealingKey::generate());

        let sealed = SealedValue::seal(&json!({"user_id": 42}), &keys).unwrap();
        let before = sealed.dump_sealed().to_vec();

        assert!(sealed.unsealed(&unrelated, |v| v.clone()).is_err());
        assert_eq!(sealed.dump_sealed(), before.as_slice());
        // And the right key still works afterwards
        assert!(sealed.unsealed(&keys, |v| v.clone()).is_ok());
    }

    #[test]
    fn test_from_parts_both_and_neither_rejected() {
        let keys = SealingKeySet::new(SealingKey::generate());
        let value = json!({"user_id": 42});

        let both = SealedValue::from_parts(Some(&value), Some(b"x".to_vec()), &keys);
        assert!(matches!(both, Err(UtilsError::InvalidConstruction { .. })));

        let neither = SealedValue::from_parts(None, None, &keys);
        assert!(matches!(neither, Err(UtilsError::InvalidConstruction { .. })));
    }

    #[test]
    fn test_from_parts_single_argument_accepted() {
        let keys = SealingKeySet::new(SealingKey::generate());
        let value = json!({"user_id": 42});

        let sealed = SealedValue::from_parts(Some(&value), None, &keys).unwrap();
        let bytes = sealed.dump_sealed().to_vec();

        let loaded = SealedValue::from_parts(None, Some(bytes), &keys).unwrap();
        assert_eq!(loaded.unsealed(&keys, |v| v.clone()).unwrap(), value);
    }

    #[test]
    fn test_display_never_leaks_contents() {
        let keys = SealingKeySet::new(SealingKey::generate());
        let sealed = SealedValue::seal(&json!({"secret": "hunter2"}), &keys).unwrap();

        let shown = format!("{sealed} {sealed:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("secret"));
        assert!(shown.contains(&format!("<{}B sealed data>", sealed.len())));
    }

    #[test]
    fn test_empty_key_set_rejected() {
        assert!(matches!(
            SealingKeySet::from_keys(Vec::new()),
            Err(UtilsError::InvalidConstruction { .. })
        ));
    }

    #[test]
    fn test_derived_keys_are_deterministic_and_domain_separated() {
        let a = SealingKey::derive(b"app secret");
        let b = SealingKey::derive(b"app secret");
        let c = SealingKey::derive(b"other secret");

        assert_eq!(a.key, b.key);
        assert_ne!(a.key, c.key);
    }

    #[test]
    fn test_sealing_key_debug_redacted() {
        let key = SealingKey::generate();
        assert_eq!(format!("{key:?}"), "SealingKey(<redacted>)");
    }

    #[test]
    fn test_app_sealer_prefers_dedicated_secret() {
        use crate::config::AppConfig;
        use crate::config::SealingConfig;

        let mut config = AppConfig::default();
        config.sealing = SealingConfig {
            secret_key: "app-secret".into(),
            sealed_value_secret_key: Some("sealing-secret".into()),
            retired_secret_keys: vec!["old-secret".into()],
        };
        let sealer = AppSealer::from_config(&config);

        let sealed = sealer.seal(&json!({"user_id": 42})).unwrap();
        assert_eq!(sealer.unsealed(&sealed, |v| v.clone()).unwrap(), json!({"user_id": 42}));

        // Values sealed under the retired secret remain readable
        let old_keys = SealingKeySet::new(SealingKey::derive(b"old-secret"));
        let old_sealed = SealedValue::seal(&json!("legacy"), &old_keys).unwrap();
        assert_eq!(sealer.unsealed(&old_sealed, |v| v.clone()).unwrap(), json!("legacy"));

        // The dedicated sealing secret is used, not the app secret
        let app_keys = SealingKeySet::new(SealingKey::derive(b"app-secret"));
        assert!(sealed.unsealed(&app_keys, |v| v.clone()).is_err());
    }
}
