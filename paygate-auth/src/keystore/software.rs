//! Software key authority.
//!
//! **NOT SUITABLE FOR PRODUCTION USE.**
//!
//! Keys live in process memory and presence is simulated through a shared
//! [`SimulatedDevice`]. Use it for development, tests, and as the reference
//! behavior platform-backed authorities must match.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use zeroize::Zeroizing;

use super::{KeyAuthority, KeyError, KeyMode, SimulatedDevice};
use crate::identity::{DeviceSigningKey, PublicKeyDer, Signature};

const SEAL_NONCE_LEN: usize = 12;

enum KeyMaterial {
    Signing(DeviceSigningKey),
    Symmetric {
        key: Zeroizing<[u8; 32]>,
        validity: Duration,
    },
}

struct KeyEntry {
    material: KeyMaterial,
    /// Device credential epoch at creation.
    epoch: u64,
}

/// In-memory [`KeyAuthority`] gated by a [`SimulatedDevice`].
pub struct SoftwareKeyAuthority {
    device: Arc<SimulatedDevice>,
    keys: Mutex<HashMap<String, KeyEntry>>,
}

impl SoftwareKeyAuthority {
    /// Create an empty authority bound to `device`.
    pub fn new(device: Arc<SimulatedDevice>) -> Self {
        tracing::warn!("software key authority in use: keys are not hardware-protected");
        Self {
            device,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// The device this authority is bound to.
    pub fn device(&self) -> &Arc<SimulatedDevice> {
        &self.device
    }

    fn store(&self) -> Result<MutexGuard<'_, HashMap<String, KeyEntry>>, KeyError> {
        if !self.device.keystore_available() {
            return Err(KeyError::KeyStoreUnavailable);
        }
        self.keys.lock().map_err(|_| KeyError::KeyStoreUnavailable)
    }

    /// Look up `alias` and check it survived every credential change.
    fn usable_entry<'a>(
        &self,
        store: &'a HashMap<String, KeyEntry>,
        alias: &str,
    ) -> Result<&'a KeyEntry, KeyError> {
        let entry = store
            .get(alias)
            .ok_or_else(|| KeyError::KeyNotFound(alias.to_string()))?;
        if entry.epoch != self.device.credential_epoch() {
            return Err(KeyError::KeyInvalidated);
        }
        Ok(entry)
    }

    /// Resolve a symmetric key and enforce its recency window.
    fn recent_cipher(&self, alias: &str) -> Result<ChaCha20Poly1305, KeyError> {
        let store = self.store()?;
        let entry = self.usable_entry(&store, alias)?;
        let KeyMaterial::Symmetric { key, validity } = &entry.material else {
            return Err(KeyError::WrongKeyMode(alias.to_string()));
        };
        if !self.device.unlocked_within(*validity) {
            return Err(KeyError::NotAuthenticated);
        }
        Ok(ChaCha20Poly1305::new(Key::from_slice(key.as_slice())))
    }
}

impl KeyAuthority for SoftwareKeyAuthority {
    fn generate_key(&self, alias: &str, mode: KeyMode) -> Result<(), KeyError> {
        let mut store = self.store()?;
        if !self.device.is_secure() {
            return Err(KeyError::DeviceNotSecure);
        }

        let material = match mode {
            KeyMode::Signing { algorithm } => {
                KeyMaterial::Signing(DeviceSigningKey::generate(algorithm))
            }
            KeyMode::SymmetricRecency { validity } => KeyMaterial::Symmetric {
                key: Zeroizing::new(rand::random::<[u8; 32]>()),
                validity,
            },
        };

        store.insert(
            alias.to_string(),
            KeyEntry {
                material,
                epoch: self.device.credential_epoch(),
            },
        );
        // A grant issued for the previous key must not carry over.
        self.device.clear_grant(alias);

        tracing::debug!(alias, ?mode, "generated key");
        Ok(())
    }

    fn check_usable(&self, alias: &str) -> Result<(), KeyError> {
        let store = self.store()?;
        self.usable_entry(&store, alias).map(|_| ())
    }

    fn sign(&self, alias: &str, payload: &[u8]) -> Result<Signature, KeyError> {
        let store = self.store()?;
        let entry = self.usable_entry(&store, alias)?;
        let KeyMaterial::Signing(key) = &entry.material else {
            return Err(KeyError::WrongKeyMode(alias.to_string()));
        };
        if !self.device.take_grant(alias) {
            return Err(KeyError::NotAuthenticated);
        }
        Ok(key.sign(payload))
    }

    fn authorize_symmetric(&self, alias: &str, payload: &[u8]) -> Result<Vec<u8>, KeyError> {
        let cipher = self.recent_cipher(alias)?;

        let nonce_bytes = rand::random::<[u8; SEAL_NONCE_LEN]>();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), payload)
            .map_err(|_| KeyError::Crypto)?;

        let mut sealed = Vec::with_capacity(SEAL_NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open_symmetric(&self, alias: &str, sealed: &[u8]) -> Result<Vec<u8>, KeyError> {
        let cipher = self.recent_cipher(alias)?;
        if sealed.len() < SEAL_NONCE_LEN {
            return Err(KeyError::Crypto);
        }
        let (nonce, ciphertext) = sealed.split_at(SEAL_NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| KeyError::Crypto)
    }

    fn export_public_key(&self, alias: &str) -> Result<PublicKeyDer, KeyError> {
        let store = self.store()?;
        let entry = self.usable_entry(&store, alias)?;
        let KeyMaterial::Signing(key) = &entry.material else {
            return Err(KeyError::WrongKeyMode(alias.to_string()));
        };
        key.verification_key()
            .to_spki_der()
            .map_err(|_| KeyError::Crypto)
    }

    fn delete_key(&self, alias: &str) -> Result<(), KeyError> {
        self.store()?.remove(alias);
        self.device.clear_grant(alias);
        Ok(())
    }

    fn contains_key(&self, alias: &str) -> Result<bool, KeyError> {
        Ok(self.store()?.contains_key(alias))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::identity::SigningAlgorithm;

    fn authority() -> (Arc<SimulatedDevice>, SoftwareKeyAuthority) {
        let device = Arc::new(SimulatedDevice::new());
        let authority = SoftwareKeyAuthority::new(Arc::clone(&device));
        (device, authority)
    }

    #[test]
    fn test_sign_requires_presence() {
        let (device, authority) = authority();
        authority.generate_key("sig", KeyMode::signing()).unwrap();

        assert_eq!(
            authority.sign("sig", b"payload").unwrap_err(),
            KeyError::NotAuthenticated
        );

        device.grant_presence("sig");
        let signature = authority.sign("sig", b"payload").unwrap();

        let public = authority.export_public_key("sig").unwrap();
        assert!(public.decode().unwrap().verify(b"payload", &signature));
    }

    #[test]
    fn test_presence_is_single_use() {
        let (device, authority) = authority();
        authority.generate_key("sig", KeyMode::signing()).unwrap();

        device.grant_presence("sig");
        authority.sign("sig", b"first").unwrap();
        assert_eq!(
            authority.sign("sig", b"second").unwrap_err(),
            KeyError::NotAuthenticated
        );
    }

    #[test]
    fn test_both_algorithms_sign() {
        for algorithm in [SigningAlgorithm::EcdsaP256Sha256, SigningAlgorithm::Ed25519] {
            let (device, authority) = authority();
            authority
                .generate_key("sig", KeyMode::Signing { algorithm })
                .unwrap();

            device.grant_presence("sig");
            let signature = authority.sign("sig", b"msg").unwrap();
            let key = authority.export_public_key("sig").unwrap().decode().unwrap();

            assert_eq!(key.algorithm(), algorithm);
            assert!(key.verify(b"msg", &signature));
        }
    }

    #[test]
    fn test_invalidation_is_permanent_until_regenerated() {
        let (device, authority) = authority();
        authority.generate_key("sig", KeyMode::signing()).unwrap();
        authority
            .generate_key("sym", KeyMode::symmetric_recency())
            .unwrap();

        device.reset_credential();
        device.grant_presence("sig");
        device.record_unlock();

        for _ in 0..3 {
            assert_eq!(
                authority.sign("sig", b"x").unwrap_err(),
                KeyError::KeyInvalidated
            );
            assert_eq!(
                authority.check_usable("sig").unwrap_err(),
                KeyError::KeyInvalidated
            );
            assert_eq!(
                authority.export_public_key("sig").unwrap_err(),
                KeyError::KeyInvalidated
            );
            assert_eq!(
                authority.authorize_symmetric("sym", b"x").unwrap_err(),
                KeyError::KeyInvalidated
            );
        }

        authority.generate_key("sig", KeyMode::signing()).unwrap();
        authority.check_usable("sig").unwrap();
        device.grant_presence("sig");
        authority.sign("sig", b"x").unwrap();
    }

    #[test]
    fn test_regenerated_key_has_new_public_key() {
        let (device, authority) = authority();
        authority.generate_key("sig", KeyMode::signing()).unwrap();
        let before = authority.export_public_key("sig").unwrap();

        device.reset_credential();
        authority.generate_key("sig", KeyMode::signing()).unwrap();
        let after = authority.export_public_key("sig").unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_grant_does_not_survive_regeneration() {
        let (device, authority) = authority();
        authority.generate_key("sig", KeyMode::signing()).unwrap();
        device.grant_presence("sig");

        authority.generate_key("sig", KeyMode::signing()).unwrap();
        assert_eq!(
            authority.sign("sig", b"x").unwrap_err(),
            KeyError::NotAuthenticated
        );
    }

    #[test]
    fn test_symmetric_outside_recency_window() {
        let (device, authority) = authority();
        authority
            .generate_key(
                "sym",
                KeyMode::SymmetricRecency {
                    validity: Duration::from_secs(5),
                },
            )
            .unwrap();

        let six_seconds_ago = Instant::now().checked_sub(Duration::from_secs(6)).unwrap();
        device.record_unlock_at(six_seconds_ago);

        assert_eq!(
            authority.authorize_symmetric("sym", b"tx").unwrap_err(),
            KeyError::NotAuthenticated
        );
    }

    #[test]
    fn test_symmetric_roundtrip_within_window() {
        let (device, authority) = authority();
        authority
            .generate_key("sym", KeyMode::symmetric_recency())
            .unwrap();
        device.record_unlock();

        let sealed = authority.authorize_symmetric("sym", b"tx bytes").unwrap();
        assert_ne!(&sealed[SEAL_NONCE_LEN..], b"tx bytes");
        assert_eq!(authority.open_symmetric("sym", &sealed).unwrap(), b"tx bytes");
    }

    #[test]
    fn test_symmetric_tamper_detected() {
        let (device, authority) = authority();
        authority
            .generate_key("sym", KeyMode::symmetric_recency())
            .unwrap();
        device.record_unlock();

        let mut sealed = authority.authorize_symmetric("sym", b"tx").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert_eq!(
            authority.open_symmetric("sym", &sealed).unwrap_err(),
            KeyError::Crypto
        );
        assert_eq!(
            authority.open_symmetric("sym", &[0u8; 4]).unwrap_err(),
            KeyError::Crypto
        );
    }

    #[test]
    fn test_wrong_mode_rejected() {
        let (device, authority) = authority();
        authority
            .generate_key("sym", KeyMode::symmetric_recency())
            .unwrap();
        authority.generate_key("sig", KeyMode::signing()).unwrap();
        device.grant_presence("sym");
        device.record_unlock();

        assert!(matches!(
            authority.sign("sym", b"x"),
            Err(KeyError::WrongKeyMode(_))
        ));
        assert!(matches!(
            authority.export_public_key("sym"),
            Err(KeyError::WrongKeyMode(_))
        ));
        assert!(matches!(
            authority.authorize_symmetric("sig", b"x"),
            Err(KeyError::WrongKeyMode(_))
        ));
    }

    #[test]
    fn test_keystore_outage() {
        let (device, authority) = authority();
        authority.generate_key("sig", KeyMode::signing()).unwrap();

        device.set_keystore_available(false);
        assert_eq!(
            authority.generate_key("other", KeyMode::signing()).unwrap_err(),
            KeyError::KeyStoreUnavailable
        );
        assert_eq!(
            authority.check_usable("sig").unwrap_err(),
            KeyError::KeyStoreUnavailable
        );

        device.set_keystore_available(true);
        authority.check_usable("sig").unwrap();
    }

    #[test]
    fn test_insecure_device_cannot_generate() {
        let (device, authority) = authority();
        device.set_secure(false);

        assert_eq!(
            authority.generate_key("sig", KeyMode::signing()).unwrap_err(),
            KeyError::DeviceNotSecure
        );
        assert!(!authority.contains_key("sig").unwrap());
    }

    #[test]
    fn test_delete_key() {
        let (_device, authority) = authority();
        authority.generate_key("sig", KeyMode::signing()).unwrap();
        assert!(authority.contains_key("sig").unwrap());

        authority.delete_key("sig").unwrap();
        assert!(!authority.contains_key("sig").unwrap());
        assert_eq!(
            authority.check_usable("sig").unwrap_err(),
            KeyError::KeyNotFound("sig".to_string())
        );

        // Deleting again is fine.
        authority.delete_key("sig").unwrap();
    }

    #[test]
    fn test_concurrent_generation() {
        use std::thread;

        let (_device, authority) = authority();
        let authority = Arc::new(authority);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let authority = Arc::clone(&authority);
                thread::spawn(move || authority.generate_key(&format!("k{i}"), KeyMode::signing()))
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked").unwrap();
        }

        for i in 0..8 {
            assert!(authority.contains_key(&format!("k{i}")).unwrap());
        }
    }
}
