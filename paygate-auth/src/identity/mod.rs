//! Device key material and the public keys a verifier enrolls.
//!
//! - [`DeviceSigningKey`] - private key held by a key authority, never exported
//! - [`VerificationKey`] - public key used by the verification backend
//! - [`PublicKeyDer`] - storage-independent SPKI DER export of a public key
//! - [`Signature`] - signature bytes over a canonical transaction
//! - [`Fingerprint`] - `SHA256:{base64}` identifier for logs and display
//!
//! Two algorithms are supported: ECDSA P-256 with SHA-256 (the default,
//! DER signatures) and Ed25519.
//!
//! # Example
//!
//! ```
//! use paygate_auth::identity::{DeviceSigningKey, SigningAlgorithm, VerificationKey};
//!
//! let key = DeviceSigningKey::generate(SigningAlgorithm::EcdsaP256Sha256);
//! let exported = key.verification_key().to_spki_der().unwrap();
//!
//! let signature = key.sign(b"payload");
//! let verifier = VerificationKey::from_spki_der(exported.as_bytes()).unwrap();
//! assert!(verifier.verify(b"payload", &signature));
//! ```

mod keys;

pub use keys::{
    DeviceSigningKey, Fingerprint, IdentityError, PublicKeyDer, Signature, SigningAlgorithm,
    VerificationKey,
};
