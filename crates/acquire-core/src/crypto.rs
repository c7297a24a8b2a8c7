//! Key capabilities for Acquire.
//!
//! Encryption keys are X25519 and work as anonymous sealed boxes: the
//! sender agrees an ephemeral secret with the recipient's public key and
//! seals with ChaCha20-Poly1305. Signing certificates are Ed25519.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{EphemeralSecret, StaticSecret};

use crate::error::CryptoError;

const SEAL_VERSION: u8 = 1;
const SEAL_CONTEXT: &str = "acquire-core-v0-seal";
const KEY_FINGERPRINT_CONTEXT: &str = "acquire-core-v0-key-fingerprint";
const CERT_FINGERPRINT_CONTEXT: &str = "acquire-core-v0-cert-fingerprint";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SEAL_HEADER_LEN: usize = 1 + 32 + NONCE_LEN;

/// A stable short identifier derived from a public key or certificate.
///
/// Rendered as 16 colon-separated hex bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    fn derive(context: &str, key_bytes: &[u8]) -> Self {
        let digest = blake3::derive_key(context, key_bytes);
        let parts: Vec<String> = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
        Self(parts.join(":"))
    }

    /// Wrap a fingerprint received from the wire.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The fingerprint as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

/// An X25519 public key used to seal data for its owner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Read a key from raw bytes, checking the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The fingerprint of this key.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::derive(KEY_FINGERPRINT_CONTEXT, &self.0)
    }

    /// Seal `plaintext` so only the holder of the matching private key can open it.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
        let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&x25519_dalek::PublicKey::from(self.0));
        let key = seal_key(shared.as_bytes(), ephemeral_public.as_bytes(), &self.0);

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(SEAL_HEADER_LEN + sealed.len());
        out.push(SEAL_VERSION);
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// The private half of an encryption key.
#[derive(Clone)]
pub struct PrivateKey(StaticSecret);

impl PrivateKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Get the raw secret bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Derive the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(*x25519_dalek::PublicKey::from(&self.0).as_bytes())
    }

    /// The fingerprint of the public half.
    pub fn fingerprint(&self) -> Fingerprint {
        self.public_key().fingerprint()
    }

    /// Open data sealed with [`PublicKey::encrypt`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < SEAL_HEADER_LEN + TAG_LEN {
            return Err(CryptoError::MalformedCiphertext(format!(
                "sealed data too short: {} bytes",
                ciphertext.len()
            )));
        }
        if ciphertext[0] != SEAL_VERSION {
            return Err(CryptoError::MalformedCiphertext(format!(
                "unsupported seal version {}",
                ciphertext[0]
            )));
        }

        let mut ephemeral_public = [0u8; 32];
        ephemeral_public.copy_from_slice(&ciphertext[1..33]);
        let nonce = &ciphertext[33..SEAL_HEADER_LEN];
        let sealed = &ciphertext[SEAL_HEADER_LEN..];

        let shared = self
            .0
            .diffie_hellman(&x25519_dalek::PublicKey::from(ephemeral_public));
        let key = seal_key(
            shared.as_bytes(),
            &ephemeral_public,
            self.public_key().as_bytes(),
        );

        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.fingerprint())
    }
}

fn seal_key(shared: &[u8; 32], ephemeral_public: &[u8; 32], recipient: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(SEAL_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral_public);
    hasher.update(recipient);
    *hasher.finalize().as_bytes()
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Read a signature from raw bytes, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

/// The public half of a signing certificate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicCert([u8; 32]);

impl PublicCert {
    /// Read a certificate from raw bytes, checking the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The fingerprint of this certificate.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::derive(CERT_FINGERPRINT_CONTEXT, &self.0)
    }

    /// Verify a signature over a message.
    pub fn verify(&self, signature: &Signature, message: &[u8]) -> Result<(), CryptoError> {
        let verifying_key = VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for PublicCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicCert({})", &self.to_hex()[..16])
    }
}

/// A signing certificate (Ed25519 keypair).
#[derive(Clone)]
pub struct PrivateCert {
    signing_key: SigningKey,
}

impl PrivateCert {
    /// Generate a new random certificate.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Get the public certificate.
    pub fn public_cert(&self) -> PublicCert {
        PublicCert(self.signing_key.verifying_key().to_bytes())
    }

    /// The fingerprint of the public certificate.
    pub fn fingerprint(&self) -> Fingerprint {
        self.public_cert().fingerprint()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for PrivateCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateCert({})", self.fingerprint())
    }
}
