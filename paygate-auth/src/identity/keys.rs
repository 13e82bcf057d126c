//! Signing keys, verification keys and signatures.
//!
//! - Device signing keys are zeroized on drop and have no `Debug`
//! - Verification keys travel as X.509 SubjectPublicKeyInfo DER
//! - Fingerprints use constant-time comparison
//! - Fingerprint format: `SHA256:{url_safe_base64_no_padding}` over the SPKI DER

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::pkcs8::{DecodePublicKey as _, EncodePublicKey as _};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::pkcs8::{DecodePublicKey as _, EncodePublicKey as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Errors that can occur while decoding or encoding key material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum IdentityError {
    /// The bytes are not a SubjectPublicKeyInfo for a supported algorithm.
    #[error("unsupported or malformed public key")]
    InvalidPublicKey,

    /// The key could not be encoded as SubjectPublicKeyInfo.
    #[error("public key encoding failed")]
    Encoding,

    /// The algorithm name is not recognized.
    #[error("unknown signing algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Signature scheme of a device signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningAlgorithm {
    /// ECDSA over NIST P-256 with SHA-256, DER-encoded signatures.
    #[default]
    EcdsaP256Sha256,
    /// Ed25519, raw 64-byte signatures.
    Ed25519,
}

impl SigningAlgorithm {
    /// Stable name used in configuration and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdsaP256Sha256 => "ecdsa-p256-sha256",
            Self::Ed25519 => "ed25519",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecdsa-p256-sha256" | "p256" | "ecdsa" => Ok(Self::EcdsaP256Sha256),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(IdentityError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// A device-held private signing key.
///
/// Lives only inside a key authority. Both underlying key types zeroize
/// their secret scalar on drop.
pub enum DeviceSigningKey {
    /// ECDSA P-256 key.
    P256(p256::ecdsa::SigningKey),
    /// Ed25519 key.
    Ed25519(ed25519_dalek::SigningKey),
}

// Explicitly NO Debug implementation for DeviceSigningKey

impl DeviceSigningKey {
    /// Generate a fresh key for the given algorithm.
    #[must_use]
    pub fn generate(algorithm: SigningAlgorithm) -> Self {
        match algorithm {
            SigningAlgorithm::EcdsaP256Sha256 => {
                Self::P256(p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng))
            }
            SigningAlgorithm::Ed25519 => {
                Self::Ed25519(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
            }
        }
    }

    /// The algorithm this key signs with.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        match self {
            Self::P256(_) => SigningAlgorithm::EcdsaP256Sha256,
            Self::Ed25519(_) => SigningAlgorithm::Ed25519,
        }
    }

    /// Sign a message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            Self::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                Signature(signature.to_der().as_bytes().to_vec())
            }
            Self::Ed25519(key) => {
                use ed25519_dalek::Signer as _;
                Signature(key.sign(message).to_bytes().to_vec())
            }
        }
    }

    /// Derive the verification key.
    #[must_use]
    pub fn verification_key(&self) -> VerificationKey {
        match self {
            Self::P256(key) => VerificationKey::P256(p256::ecdsa::VerifyingKey::from(key)),
            Self::Ed25519(key) => VerificationKey::Ed25519(key.verifying_key()),
        }
    }
}

/// A public verification key, independent of any key store.
#[derive(Clone, PartialEq, Eq)]
pub enum VerificationKey {
    /// ECDSA P-256 verifying key.
    P256(p256::ecdsa::VerifyingKey),
    /// Ed25519 verifying key.
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl VerificationKey {
    /// Decode a SubjectPublicKeyInfo DER document.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidPublicKey` if the document is malformed
    /// or names an algorithm other than P-256 ECDSA or Ed25519.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, IdentityError> {
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
            return Ok(Self::P256(key));
        }
        ed25519_dalek::VerifyingKey::from_public_key_der(der)
            .map(Self::Ed25519)
            .map_err(|_| IdentityError::InvalidPublicKey)
    }

    /// Encode as SubjectPublicKeyInfo DER.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Encoding` if the encoder fails.
    pub fn to_spki_der(&self) -> Result<PublicKeyDer, IdentityError> {
        let bytes = match self {
            Self::P256(key) => key
                .to_public_key_der()
                .map_err(|_| IdentityError::Encoding)?
                .as_bytes()
                .to_vec(),
            Self::Ed25519(key) => key
                .to_public_key_der()
                .map_err(|_| IdentityError::Encoding)?
                .as_bytes()
                .to_vec(),
        };
        Ok(PublicKeyDer(bytes))
    }

    /// The algorithm signatures under this key use.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        match self {
            Self::P256(_) => SigningAlgorithm::EcdsaP256Sha256,
            Self::Ed25519(_) => SigningAlgorithm::Ed25519,
        }
    }

    /// Verify a signature over a message.
    ///
    /// Ed25519 uses `verify_strict` to reject weak/small-order keys.
    /// Malformed signature bytes verify as `false`.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        match self {
            Self::P256(key) => p256::ecdsa::Signature::from_der(signature.as_bytes())
                .map(|sig| key.verify(message, &sig).is_ok())
                .unwrap_or(false),
            Self::Ed25519(key) => ed25519_dalek::Signature::from_slice(signature.as_bytes())
                .map(|sig| key.verify_strict(message, &sig).is_ok())
                .unwrap_or(false),
        }
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Fingerprint::from_verification_key(self) {
            Ok(fp) => write!(f, "VerificationKey({}, {fp})", self.algorithm()),
            Err(_) => write!(f, "VerificationKey({})", self.algorithm()),
        }
    }
}

/// An exported public key: X.509 SubjectPublicKeyInfo DER bytes.
///
/// This is a plain value with no tie to the key store that produced it, so
/// it can be transmitted to and re-parsed by a verifier.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyDer(Vec<u8>);

impl PublicKeyDer {
    /// Wrap raw SPKI DER bytes without validating them.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the DER bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse into a verification key.
    ///
    /// # Errors
    ///
    /// See [`VerificationKey::from_spki_der`].
    pub fn decode(&self) -> Result<VerificationKey, IdentityError> {
        VerificationKey::from_spki_der(&self.0)
    }
}

impl fmt::Debug for PublicKeyDer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyDer({} bytes)", self.0.len())
    }
}

/// Signature bytes as produced by a device signing key.
///
/// DER for ECDSA, 64 raw bytes for Ed25519.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wrap raw signature bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Get the raw signature bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Show only the first few bytes
        let head: String = self.0.iter().take(4).map(|b| format!("{b:02x}")).collect();
        write!(f, "Signature({head}...)")
    }
}

/// A SHA-256 fingerprint of a public key's SPKI encoding.
///
/// Format: `SHA256:{base64_no_padding}`
#[derive(Clone, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::derived_hash_with_manual_eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The prefix used for fingerprint strings.
    pub const PREFIX: &'static str = "SHA256:";

    /// Fingerprint an exported public key.
    #[must_use]
    pub fn from_der(der: &PublicKeyDer) -> Self {
        let hash = Sha256::digest(der.as_bytes());
        Self(format!("{}{}", Self::PREFIX, URL_SAFE_NO_PAD.encode(hash)))
    }

    /// Fingerprint a verification key.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Encoding` if the key cannot be encoded.
    pub fn from_verification_key(key: &VerificationKey) -> Result<Self, IdentityError> {
        key.to_spki_der().map(|der| Self::from_der(&der))
    }

    /// Get the fingerprint as a string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}
