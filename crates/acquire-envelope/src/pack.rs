//! Packing payloads into envelopes.

use acquire_core::value::entry;
use acquire_core::{time, CertResolver, Classify, Fingerprint, PublicCert, PublicKey, Value};

use crate::error::{EnvelopeError, Result};
use crate::outcome::failure_value;
use crate::unpack::KeyHints;
use crate::wire::{encode, keys};

/// Key material used while packing an envelope.
#[derive(Clone, Copy, Default)]
pub struct PackOptions<'a> {
    encrypt_key: Option<&'a PublicKey>,
    response_key: Option<&'a PublicKey>,
    response_cert: Option<&'a PublicCert>,
    sign_with: Option<&'a Fingerprint>,
    certs: Option<&'a dyn CertResolver>,
}

impl<'a> PackOptions<'a> {
    /// Plaintext envelope, no reply keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a reply, built from the hints a caller sent.
    ///
    /// The reply is sealed with the caller's response key and, if the
    /// caller asked for it, signed with the certificate it named.
    pub fn reply_to(hints: &'a KeyHints, certs: Option<&'a dyn CertResolver>) -> Self {
        Self {
            encrypt_key: hints.response_key.as_ref(),
            sign_with: hints.sign_with.as_ref(),
            certs,
            ..Self::default()
        }
    }

    /// Seal the envelope for the holder of `key`.
    pub fn encrypt_for(mut self, key: &'a PublicKey) -> Self {
        self.encrypt_key = Some(key);
        self
    }

    /// Ask the callee to seal its reply for `key`.
    pub fn respond_with(mut self, key: &'a PublicKey) -> Self {
        self.response_key = Some(key);
        self
    }

    /// Ask the callee to sign its reply with the certificate matching `cert`.
    pub fn request_signature(mut self, cert: &'a PublicCert) -> Self {
        self.response_cert = Some(cert);
        self
    }

    /// Sign the sealed envelope with the certificate registered under `fingerprint`.
    pub fn sign_with(mut self, fingerprint: &'a Fingerprint, certs: &'a dyn CertResolver) -> Self {
        self.sign_with = Some(fingerprint);
        self.certs = Some(certs);
        self
    }

    /// Whether the envelope will be sealed.
    pub fn is_encrypted(&self) -> bool {
        self.encrypt_key.is_some()
    }
}

/// Pack `payload` (and the target `function`, if any) into an envelope.
pub fn pack(function: Option<&str>, payload: Value, opts: &PackOptions<'_>) -> Result<Vec<u8>> {
    if opts.response_cert.is_some() && opts.response_key.is_none() {
        return Err(EnvelopeError::Packing(
            "cannot ask the service to sign the response without also providing a key to encrypt it with"
                .into(),
        ));
    }
    if opts.sign_with.is_some() && opts.encrypt_key.is_none() {
        return Err(EnvelopeError::Packing(
            "the envelope must be encrypted before it can be signed".into(),
        ));
    }

    let synctime = time::synctime();

    let mut record = Vec::with_capacity(5);
    if let Some(key) = opts.response_key {
        record.push(entry(
            keys::ENCRYPTION_PUBLIC_KEY,
            Value::Bytes(key.as_bytes().to_vec()),
        ));
        if let Some(cert) = opts.response_cert {
            record.push(entry(keys::SIGN_WITH_SERVICE_KEY, cert.fingerprint().as_str()));
        }
    }
    record.push(entry(keys::PAYLOAD, payload));
    record.push(entry(keys::SYNCTIME, synctime.as_str()));
    record.push(entry(
        keys::FUNCTION,
        function.map_or(Value::Null, Value::from),
    ));

    let plain = encode(&Value::Map(record))?;

    let Some(key) = opts.encrypt_key else {
        return Ok(plain);
    };

    let data = key.encrypt(&plain)?;

    let mut sealed = Vec::with_capacity(5);
    if let Some(fingerprint) = opts.sign_with {
        let cert = opts
            .certs
            .and_then(|c| c.resolve_cert(fingerprint))
            .ok_or_else(|| {
                EnvelopeError::KeyResolution(format!(
                    "no signing certificate with fingerprint {fingerprint}"
                ))
            })?;
        sealed.push(entry(
            keys::SIGNATURE,
            Value::Bytes(cert.sign(&data).as_bytes().to_vec()),
        ));
    }
    sealed.push(entry(keys::DATA, Value::Bytes(data)));
    sealed.push(entry(keys::ENCRYPTED, true));
    sealed.push(entry(keys::FINGERPRINT, key.fingerprint().as_str()));
    sealed.push(entry(keys::SYNCTIME, synctime.as_str()));

    encode(&Value::Map(sealed))
}

/// Pack the arguments of a call to `function`.
pub fn pack_arguments(function: &str, args: Value, opts: &PackOptions<'_>) -> Result<Vec<u8>> {
    pack(Some(function), args, opts)
}

/// Pack a status record as the reply to a call that sent `hints`.
pub fn pack_return_value(
    payload: Value,
    hints: &KeyHints,
    certs: Option<&dyn CertResolver>,
) -> Result<Vec<u8>> {
    pack(None, payload, &PackOptions::reply_to(hints, certs))
}

/// Pack an error as a plaintext reply.
///
/// Used when a reply cannot be packed with the caller's keys, so the
/// caller still receives a well-formed envelope.
pub fn pack_failure<E: Classify + ?Sized>(err: &E) -> Vec<u8> {
    let record = Value::Map(vec![
        entry(keys::PAYLOAD, failure_value(err)),
        entry(keys::SYNCTIME, time::synctime().as_str()),
        entry(keys::FUNCTION, Value::Null),
    ]);
    let mut buf = Vec::new();
    ciborium::into_writer(&record, &mut buf).expect("CBOR serialization into memory failed");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquire_core::value::{get, get_text, text_map};
    use acquire_core::{PrivateCert, PrivateKey};

    use crate::wire::decode;

    fn payload() -> Value {
        text_map([("x", Value::from(1))])
    }

    #[test]
    fn test_plain_envelope_shape() {
        let bytes = pack(Some("add_one"), payload(), &PackOptions::new()).unwrap();
        let record = decode(&bytes).unwrap();

        assert_eq!(get(&record, keys::PAYLOAD), Some(&payload()));
        assert_eq!(get_text(&record, keys::FUNCTION), Some("add_one"));
        assert!(get_text(&record, keys::SYNCTIME).is_some());
        assert!(get(&record, keys::ENCRYPTED).is_none());
        assert!(get(&record, keys::ENCRYPTION_PUBLIC_KEY).is_none());
    }

    #[test]
    fn test_null_function_is_encoded() {
        let bytes = pack(None, payload(), &PackOptions::new()).unwrap();
        let record = decode(&bytes).unwrap();
        assert_eq!(get(&record, keys::FUNCTION), Some(&Value::Null));
    }

    #[test]
    fn test_encrypted_envelope_shape() {
        let key = PrivateKey::generate();
        let public = key.public_key();
        let opts = PackOptions::new().encrypt_for(&public);
        let record = decode(&pack(Some("f"), payload(), &opts).unwrap()).unwrap();

        assert_eq!(get(&record, keys::ENCRYPTED), Some(&Value::Bool(true)));
        assert_eq!(
            get_text(&record, keys::FINGERPRINT),
            Some(key.fingerprint().as_str())
        );
        assert!(matches!(get(&record, keys::DATA), Some(Value::Bytes(_))));
        assert!(get(&record, keys::PAYLOAD).is_none());
        assert!(get(&record, keys::SIGNATURE).is_none());
    }

    #[test]
    fn test_response_hints_embedded() {
        let response = PrivateKey::generate().public_key();
        let cert = PrivateCert::generate().public_cert();
        let opts = PackOptions::new()
            .respond_with(&response)
            .request_signature(&cert);
        let record = decode(&pack(Some("f"), payload(), &opts).unwrap()).unwrap();

        assert_eq!(
            get(&record, keys::ENCRYPTION_PUBLIC_KEY),
            Some(&Value::Bytes(response.as_bytes().to_vec()))
        );
        assert_eq!(
            get_text(&record, keys::SIGN_WITH_SERVICE_KEY),
            Some(cert.fingerprint().as_str())
        );
    }

    #[test]
    fn test_sign_without_encryption_rejected() {
        let cert = PrivateCert::generate();
        let fp = cert.fingerprint();
        let opts = PackOptions::new().sign_with(&fp, &cert);

        assert!(matches!(
            pack(None, payload(), &opts),
            Err(EnvelopeError::Packing(_))
        ));
    }

    #[test]
    fn test_signature_request_without_response_key_rejected() {
        let cert = PrivateCert::generate().public_cert();
        let opts = PackOptions::new().request_signature(&cert);

        assert!(matches!(
            pack(Some("f"), payload(), &opts),
            Err(EnvelopeError::Packing(_))
        ));
    }

    #[test]
    fn test_reply_hints_with_signing_but_no_key_rejected() {
        let cert = PrivateCert::generate();
        let hints = KeyHints {
            response_key: None,
            sign_with: Some(cert.fingerprint()),
        };

        assert!(matches!(
            pack_return_value(payload(), &hints, Some(&cert)),
            Err(EnvelopeError::Packing(_))
        ));
    }

    #[test]
    fn test_unknown_signing_cert_rejected() {
        let key = PrivateKey::generate().public_key();
        let cert = PrivateCert::generate();
        let other = PrivateCert::generate().fingerprint();
        let opts = PackOptions::new().encrypt_for(&key).sign_with(&other, &cert);

        assert!(matches!(
            pack(None, payload(), &opts),
            Err(EnvelopeError::KeyResolution(_))
        ));
    }
}
