//! Fingerprint-keyed lookup of private key material.

use std::collections::HashMap;

use crate::crypto::{Fingerprint, PrivateCert, PrivateKey};

/// Finds the private key that can open data sealed for a fingerprint.
pub trait KeyResolver: Send + Sync {
    /// Return the key whose public half has this fingerprint.
    fn resolve_key(&self, fingerprint: &Fingerprint) -> Option<PrivateKey>;
}

/// Finds the signing certificate registered under a fingerprint.
pub trait CertResolver: Send + Sync {
    /// Return the certificate whose public half has this fingerprint.
    fn resolve_cert(&self, fingerprint: &Fingerprint) -> Option<PrivateCert>;
}

impl KeyResolver for PrivateKey {
    fn resolve_key(&self, fingerprint: &Fingerprint) -> Option<PrivateKey> {
        (self.fingerprint() == *fingerprint).then(|| self.clone())
    }
}

impl CertResolver for PrivateCert {
    fn resolve_cert(&self, fingerprint: &Fingerprint) -> Option<PrivateCert> {
        (self.fingerprint() == *fingerprint).then(|| self.clone())
    }
}

/// A set of private keys and certificates, indexed by fingerprint.
///
/// Services keep retired keys here so envelopes sealed before a key
/// rotation can still be opened.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: HashMap<Fingerprint, PrivateKey>,
    certs: HashMap<Fingerprint, PrivateCert>,
}

impl Keyring {
    /// Create an empty keyring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an encryption key.
    pub fn add_key(&mut self, key: PrivateKey) -> &mut Self {
        self.keys.insert(key.fingerprint(), key);
        self
    }

    /// Add a signing certificate.
    pub fn add_cert(&mut self, cert: PrivateCert) -> &mut Self {
        self.certs.insert(cert.fingerprint(), cert);
        self
    }

    /// Builder-style [`Keyring::add_key`].
    pub fn with_key(mut self, key: PrivateKey) -> Self {
        self.add_key(key);
        self
    }

    /// Builder-style [`Keyring::add_cert`].
    pub fn with_cert(mut self, cert: PrivateCert) -> Self {
        self.add_cert(cert);
        self
    }

    /// Number of encryption keys held.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of certificates held.
    pub fn cert_count(&self) -> usize {
        self.certs.len()
    }
}

impl KeyResolver for Keyring {
    fn resolve_key(&self, fingerprint: &Fingerprint) -> Option<PrivateKey> {
        self.keys.get(fingerprint).cloned()
    }
}

impl CertResolver for Keyring {
    fn resolve_cert(&self, fingerprint: &Fingerprint) -> Option<PrivateCert> {
        self.certs.get(fingerprint).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_key_resolves_own_fingerprint_only() {
        let key = PrivateKey::generate();
        let other = PrivateKey::generate();

        assert!(key.resolve_key(&key.fingerprint()).is_some());
        assert!(key.resolve_key(&other.fingerprint()).is_none());
    }

    #[test]
    fn test_keyring_lookup() {
        let old = PrivateKey::generate();
        let new = PrivateKey::generate();
        let cert = PrivateCert::generate();
        let ring = Keyring::new()
            .with_key(old.clone())
            .with_key(new.clone())
            .with_cert(cert.clone());

        assert_eq!(ring.key_count(), 2);
        assert_eq!(
            ring.resolve_key(&old.fingerprint()).unwrap().public_key(),
            old.public_key()
        );
        assert_eq!(
            ring.resolve_cert(&cert.fingerprint()).unwrap().public_cert(),
            cert.public_cert()
        );
        assert!(ring.resolve_cert(&new.fingerprint()).is_none());
    }
}
