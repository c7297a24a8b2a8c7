//! Unpacking envelopes.
//!
//! Encrypted envelopes are opened one layer at a time: verify the
//! signature over the ciphertext (outermost layer only), resolve the
//! private key named by the fingerprint, decrypt, decode again. The
//! number of layers is capped by [`UnpackOptions::max_depth`].

use acquire_core::time::parse_synctime;
use acquire_core::value::{get, get_text};
use acquire_core::{Fingerprint, KeyResolver, PublicCert, PublicKey, Signature, Value};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{EnvelopeError, Result};
use crate::outcome::RemoteException;
use crate::wire::{decode, keys, MAX_NESTING_DEPTH};

const UNKNOWN: &str = "unknown";

/// Reply key material a caller embedded in its request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyHints {
    /// Key the reply must be sealed with.
    pub response_key: Option<PublicKey>,
    /// Certificate the reply must be signed with.
    pub sign_with: Option<Fingerprint>,
}

impl KeyHints {
    fn from_record(record: &[(Value, Value)]) -> Result<Self> {
        let response_key = match get(record, keys::ENCRYPTION_PUBLIC_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::Bytes(b)) => Some(PublicKey::from_bytes(b).map_err(|e| {
                EnvelopeError::KeyResolution(format!("bad response key: {e}"))
            })?),
            Some(_) => {
                return Err(EnvelopeError::Decode(
                    "response key is not a byte string".into(),
                ))
            }
        };
        let sign_with = get_text(record, keys::SIGN_WITH_SERVICE_KEY).map(Fingerprint::new);

        Ok(Self {
            response_key,
            sign_with,
        })
    }

    /// Whether the caller asked for anything on the reply leg.
    pub fn is_empty(&self) -> bool {
        self.response_key.is_none() && self.sign_with.is_none()
    }
}

/// Key material and context used while unpacking.
#[derive(Clone, Copy)]
pub struct UnpackOptions<'a> {
    keys: Option<&'a dyn KeyResolver>,
    verify_cert: Option<&'a PublicCert>,
    function: Option<&'a str>,
    service: Option<&'a str>,
    max_depth: usize,
}

impl Default for UnpackOptions<'_> {
    fn default() -> Self {
        Self {
            keys: None,
            verify_cert: None,
            function: None,
            service: None,
            max_depth: MAX_NESTING_DEPTH,
        }
    }
}

impl<'a> UnpackOptions<'a> {
    /// No keys, no verification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decrypt with the key (or keyring) resolving each layer's fingerprint.
    pub fn decrypt_with(mut self, keys: &'a dyn KeyResolver) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Require the outer layer to be signed by `cert`.
    pub fn verify_with(mut self, cert: &'a PublicCert) -> Self {
        self.verify_cert = Some(cert);
        self
    }

    /// Name the call, for error messages.
    pub fn calling(mut self, function: &'a str, service: &'a str) -> Self {
        self.function = Some(function);
        self.service = Some(service);
        self
    }

    /// Cap the number of encrypted layers.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    fn function_name(&self) -> &str {
        self.function.unwrap_or(UNKNOWN)
    }

    fn service_name(&self) -> &str {
        self.service.unwrap_or(UNKNOWN)
    }
}

/// An unpacked call.
#[derive(Debug, Clone, PartialEq)]
pub struct UnpackedCall {
    /// Target function, `None` for the root handler.
    pub function: Option<String>,
    /// Call arguments.
    pub args: Value,
    /// Reply key material.
    pub hints: KeyHints,
    /// Creation time of the innermost record, if it carries a valid stamp.
    pub synctime: Option<DateTime<Utc>>,
    /// The innermost decoded record.
    pub record: Value,
}

/// Unpack call arguments. Empty input means no call and yields `None`.
pub fn unpack_arguments(data: &[u8], opts: &UnpackOptions<'_>) -> Result<Option<UnpackedCall>> {
    if data.is_empty() {
        return Ok(None);
    }

    let record = open(data, opts, false)?;
    let args = payload_of(&record)?.clone();
    let function = get_text(&record, keys::FUNCTION).map(str::to_string);
    let synctime = get_text(&record, keys::SYNCTIME).and_then(parse_synctime);
    let hints = KeyHints::from_record(&record)?;

    Ok(Some(UnpackedCall {
        function,
        args,
        hints,
        synctime,
        record: Value::Map(record),
    }))
}

/// Unpack a reply. Empty input yields `None`.
///
/// A non-zero status is turned into an error: the rebuilt remote error
/// if the reply carries one, otherwise [`EnvelopeError::RemoteCall`].
pub fn unpack_return_value(data: &[u8], opts: &UnpackOptions<'_>) -> Result<Option<Value>> {
    if data.is_empty() {
        return Ok(None);
    }

    let record = open(data, opts, true)?;
    let payload = payload_of(&record)?;

    Ok(payload
        .as_map()
        .and_then(|m| get(m, keys::RETURN))
        .filter(|v| !v.is_null())
        .cloned())
}

fn payload_of(record: &[(Value, Value)]) -> Result<&Value> {
    match get(record, keys::PAYLOAD) {
        None | Some(Value::Null) => Err(EnvelopeError::MissingPayload(format!(
            "record has keys {:?}",
            record
                .iter()
                .filter_map(|(k, _)| k.as_text())
                .collect::<Vec<_>>()
        ))),
        Some(payload) => Ok(payload),
    }
}

/// Peel encrypted layers until a plaintext record remains.
fn open(
    data: &[u8],
    opts: &UnpackOptions<'_>,
    is_return_value: bool,
) -> Result<Vec<(Value, Value)>> {
    let mut verify = opts.verify_cert;
    let mut bytes = data.to_vec();

    for depth in 0..=opts.max_depth {
        let record = decode(&bytes)?;

        // A plaintext error reply explains more than a signature failure would.
        if is_return_value {
            if let Some(payload) = get(&record, keys::PAYLOAD) {
                check_status(payload, opts)?;
            }
        }

        let encrypted = matches!(get(&record, keys::ENCRYPTED), Some(Value::Bool(true)));

        if let Some(cert) = verify.take() {
            verify_layer(&record, encrypted, cert, opts)?;
        }

        if !encrypted {
            return Ok(record);
        }

        let ciphertext = match get(&record, keys::DATA) {
            Some(Value::Bytes(b)) => b,
            _ => {
                return Err(EnvelopeError::Decode(
                    "encrypted envelope carries no data".into(),
                ))
            }
        };
        let fingerprint = get_text(&record, keys::FINGERPRINT)
            .map(Fingerprint::new)
            .ok_or_else(|| {
                EnvelopeError::KeyResolution("encrypted envelope carries no fingerprint".into())
            })?;

        let key = opts
            .keys
            .ok_or_else(|| {
                EnvelopeError::KeyResolution(format!(
                    "no key available to decrypt data sealed for {fingerprint}"
                ))
            })?
            .resolve_key(&fingerprint)
            .ok_or_else(|| {
                EnvelopeError::KeyResolution(format!(
                    "cannot find the key with fingerprint {fingerprint}"
                ))
            })?;

        debug!(depth, %fingerprint, "opening encrypted envelope layer");
        bytes = key.decrypt(ciphertext)?;
    }

    Err(EnvelopeError::NestingTooDeep(opts.max_depth))
}

fn verify_layer(
    record: &[(Value, Value)],
    encrypted: bool,
    cert: &PublicCert,
    opts: &UnpackOptions<'_>,
) -> Result<()> {
    if !encrypted {
        return Err(EnvelopeError::Signature(format!(
            "the result of calling '{}' on '{}' should be signed, but only encrypted results are signed",
            opts.function_name(),
            opts.service_name()
        )));
    }

    let signature = match get(record, keys::SIGNATURE) {
        Some(Value::Bytes(b)) => Signature::from_slice(b)
            .map_err(|e| EnvelopeError::Signature(format!("malformed signature: {e}")))?,
        _ => {
            return Err(EnvelopeError::Signature(format!(
                "a signature was requested when calling '{}' on '{}', but none was provided",
                opts.function_name(),
                opts.service_name()
            )))
        }
    };

    let ciphertext = match get(record, keys::DATA) {
        Some(Value::Bytes(b)) => b.as_slice(),
        _ => &[],
    };

    cert.verify(&signature, ciphertext).map_err(|e| {
        EnvelopeError::Signature(format!(
            "the signature of the data returned by '{}' on '{}' does not match: {e}",
            opts.function_name(),
            opts.service_name()
        ))
    })
}

fn check_status(payload: &Value, opts: &UnpackOptions<'_>) -> Result<()> {
    let Some(map) = payload.as_map() else {
        return Ok(());
    };
    let (function, service) = (opts.function_name(), opts.service_name());

    if map.len() == 1 {
        if let Some(error) = get(map, keys::ERROR) {
            return Err(EnvelopeError::RemoteCall(format!(
                "Calling '{function}' on '{service}' resulted in error: '{}'",
                describe(error)
            )));
        }
    }

    let status = match get(map, keys::STATUS) {
        Some(Value::Integer(i)) => i128::from(*i),
        _ => return Ok(()),
    };
    if status == 0 {
        return Ok(());
    }

    match get(map, keys::EXCEPTION) {
        Some(exdata) => Err(match RemoteException::from_value(exdata) {
            Ok(exc) => EnvelopeError::Remote(exc.into_remote_error(function, service)),
            Err(cause) => EnvelopeError::RemoteCall(format!(
                "An exception occurred while calling '{function}' on '{service}'. \
                 CAUSE: {cause}. EXDATA: {exdata:?}"
            )),
        }),
        None => Err(EnvelopeError::RemoteCall(format!(
            "Calling '{function}' on '{service}' exited with status {status}: {}",
            describe(payload)
        ))),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquire_core::value::text_map;
    use acquire_core::{ErrorKind, PrivateCert, PrivateKey};

    use crate::outcome::{failure_value, success_value};
    use crate::pack::{pack, pack_arguments, pack_return_value, PackOptions};
    use crate::wire::encode;

    fn args() -> Value {
        text_map([("x", Value::from(1))])
    }

    #[test]
    fn test_plain_roundtrip() {
        let bytes = pack_arguments("add_one", args(), &PackOptions::new()).unwrap();
        let call = unpack_arguments(&bytes, &UnpackOptions::new())
            .unwrap()
            .unwrap();

        assert_eq!(call.function.as_deref(), Some("add_one"));
        assert_eq!(call.args, args());
        assert!(call.hints.is_empty());
        let packed_at = call.synctime.unwrap();
        assert!((chrono::Utc::now() - packed_at).num_seconds().abs() < 60);
    }

    #[test]
    fn test_empty_input_is_no_call() {
        assert!(unpack_arguments(&[], &UnpackOptions::new()).unwrap().is_none());
        assert!(unpack_return_value(&[], &UnpackOptions::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let key = PrivateKey::generate();
        let public = key.public_key();
        let bytes = pack_arguments("f", args(), &PackOptions::new().encrypt_for(&public)).unwrap();

        let call = unpack_arguments(&bytes, &UnpackOptions::new().decrypt_with(&key))
            .unwrap()
            .unwrap();
        assert_eq!(call.args, args());
    }

    #[test]
    fn test_fingerprint_mismatch() {
        let key = PrivateKey::generate();
        let wrong = PrivateKey::generate();
        let public = key.public_key();
        let bytes = pack_arguments("f", args(), &PackOptions::new().encrypt_for(&public)).unwrap();

        let err = unpack_arguments(&bytes, &UnpackOptions::new().decrypt_with(&wrong)).unwrap_err();
        assert!(matches!(err, EnvelopeError::KeyResolution(_)));
    }

    #[test]
    fn test_encrypted_without_key() {
        let public = PrivateKey::generate().public_key();
        let bytes = pack_arguments("f", args(), &PackOptions::new().encrypt_for(&public)).unwrap();

        assert!(matches!(
            unpack_arguments(&bytes, &UnpackOptions::new()),
            Err(EnvelopeError::KeyResolution(_))
        ));
    }

    #[test]
    fn test_hints_survive_encryption() {
        let service = PrivateKey::generate();
        let service_public = service.public_key();
        let response = PrivateKey::generate().public_key();
        let cert = PrivateCert::generate().public_cert();

        let opts = PackOptions::new()
            .encrypt_for(&service_public)
            .respond_with(&response)
            .request_signature(&cert);
        let bytes = pack_arguments("f", args(), &opts).unwrap();
        let call = unpack_arguments(&bytes, &UnpackOptions::new().decrypt_with(&service))
            .unwrap()
            .unwrap();

        assert_eq!(call.hints.response_key, Some(response));
        assert_eq!(call.hints.sign_with, Some(cert.fingerprint()));
    }

    fn signed_reply(caller: &PrivateKey, cert: &PrivateCert) -> Vec<u8> {
        let hints = KeyHints {
            response_key: Some(caller.public_key()),
            sign_with: Some(cert.fingerprint()),
        };
        pack_return_value(success_value(Some(args())), &hints, Some(cert)).unwrap()
    }

    #[test]
    fn test_signed_reply_verifies() {
        let caller = PrivateKey::generate();
        let cert = PrivateCert::generate();
        let public_cert = cert.public_cert();
        let bytes = signed_reply(&caller, &cert);

        let opts = UnpackOptions::new()
            .decrypt_with(&caller)
            .verify_with(&public_cert);
        assert_eq!(unpack_return_value(&bytes, &opts).unwrap(), Some(args()));
    }

    #[test]
    fn test_missing_signature_rejected() {
        let caller = PrivateKey::generate();
        let caller_public = caller.public_key();
        let cert = PrivateCert::generate().public_cert();
        let bytes = pack(
            None,
            success_value(None),
            &PackOptions::new().encrypt_for(&caller_public),
        )
        .unwrap();

        let opts = UnpackOptions::new().decrypt_with(&caller).verify_with(&cert);
        assert!(matches!(
            unpack_return_value(&bytes, &opts),
            Err(EnvelopeError::Signature(_))
        ));
    }

    #[test]
    fn test_unencrypted_reply_cannot_be_verified() {
        let cert = PrivateCert::generate().public_cert();
        let bytes = pack(None, success_value(None), &PackOptions::new()).unwrap();

        assert!(matches!(
            unpack_return_value(&bytes, &UnpackOptions::new().verify_with(&cert)),
            Err(EnvelopeError::Signature(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let caller = PrivateKey::generate();
        let cert = PrivateCert::generate();
        let public_cert = cert.public_cert();
        let bytes = signed_reply(&caller, &cert);

        let mut record = decode(&bytes).unwrap();
        for (k, v) in record.iter_mut() {
            if k.as_text() == Some(keys::DATA) {
                if let Value::Bytes(b) = v {
                    let last = b.len() - 1;
                    b[last] ^= 0x01;
                }
            }
        }
        let tampered = encode(&Value::Map(record)).unwrap();

        let opts = UnpackOptions::new()
            .decrypt_with(&caller)
            .verify_with(&public_cert);
        assert!(matches!(
            unpack_return_value(&tampered, &opts),
            Err(EnvelopeError::Signature(_))
        ));
    }

    #[test]
    fn test_missing_payload() {
        let bytes = encode(&text_map([(keys::FUNCTION, Value::from("f"))])).unwrap();
        assert!(matches!(
            unpack_arguments(&bytes, &UnpackOptions::new()),
            Err(EnvelopeError::MissingPayload(_))
        ));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            unpack_arguments(b"not an envelope", &UnpackOptions::new()),
            Err(EnvelopeError::Decode(_))
        ));
    }

    #[test]
    fn test_nested_layers_are_opened() {
        let key = PrivateKey::generate();
        let public = key.public_key();
        let inner = pack_arguments("f", args(), &PackOptions::new().encrypt_for(&public)).unwrap();

        // Wrap the sealed inner envelope in a second sealed layer.
        let outer_data = public.encrypt(&inner).unwrap();
        let outer = encode(&text_map([
            (keys::DATA, Value::Bytes(outer_data)),
            (keys::ENCRYPTED, Value::Bool(true)),
            (keys::FINGERPRINT, Value::from(key.fingerprint().as_str())),
        ]))
        .unwrap();

        let call = unpack_arguments(&outer, &UnpackOptions::new().decrypt_with(&key))
            .unwrap()
            .unwrap();
        assert_eq!(call.args, args());

        let shallow = UnpackOptions::new().decrypt_with(&key).max_depth(1);
        assert!(matches!(
            unpack_arguments(&outer, &shallow),
            Err(EnvelopeError::NestingTooDeep(1))
        ));
    }

    #[test]
    fn test_remote_exception_is_rebuilt() {
        #[derive(Debug, thiserror::Error)]
        #[error("PAR has expired")]
        struct Expired;

        impl acquire_core::Classify for Expired {
            fn kind(&self) -> ErrorKind {
                ErrorKind::Expiry
            }

            fn module(&self) -> &'static str {
                "acquire_par"
            }
        }

        let bytes = pack(None, failure_value(&Expired), &PackOptions::new()).unwrap();
        let opts = UnpackOptions::new().calling("read", "storage");

        match unpack_return_value(&bytes, &opts) {
            Err(EnvelopeError::Remote(remote)) => {
                assert_eq!(remote.kind(), ErrorKind::Expiry);
                assert_eq!(
                    remote.message(),
                    "Error calling 'read' on 'storage': PAR has expired"
                );
            }
            other => panic!("expected a remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_error_payload() {
        let payload = text_map([(keys::ERROR, Value::from("boom"))]);
        let bytes = pack(None, payload, &PackOptions::new()).unwrap();

        assert!(matches!(
            unpack_return_value(&bytes, &UnpackOptions::new()),
            Err(EnvelopeError::RemoteCall(_))
        ));
    }

    #[test]
    fn test_nonzero_status_without_exception() {
        let payload = text_map([
            (keys::STATUS, Value::from(-3)),
            (keys::ERROR, Value::from("could not build return value")),
        ]);
        let bytes = pack(None, payload, &PackOptions::new()).unwrap();

        assert!(matches!(
            unpack_return_value(&bytes, &UnpackOptions::new()),
            Err(EnvelopeError::RemoteCall(_))
        ));
    }

    #[test]
    fn test_malformed_exception_data() {
        let payload = text_map([
            (keys::STATUS, Value::from(-1)),
            (keys::EXCEPTION, Value::from("not a map")),
        ]);
        let bytes = pack(None, payload, &PackOptions::new()).unwrap();

        match unpack_return_value(&bytes, &UnpackOptions::new()) {
            Err(EnvelopeError::RemoteCall(msg)) => {
                assert!(msg.contains("CAUSE"));
                assert!(msg.contains("EXDATA"));
            }
            other => panic!("expected a remote call error, got {other:?}"),
        }
    }

    #[test]
    fn test_return_value_without_return_is_none() {
        let bytes = pack(None, success_value(None), &PackOptions::new()).unwrap();
        assert_eq!(unpack_return_value(&bytes, &UnpackOptions::new()).unwrap(), None);
    }
}
