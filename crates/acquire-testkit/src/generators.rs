//! Proptest generators for property-based testing.

use acquire_core::{PrivateKey, Value};
use proptest::prelude::*;

/// Generate a random encryption key.
pub fn private_key() -> impl Strategy<Value = PrivateKey> {
    any::<[u8; 32]>().prop_map(PrivateKey::from_bytes)
}

/// Generate a function name, optionally namespaced.
pub fn function_name() -> impl Strategy<Value = String> {
    "([a-z][a-z0-9_]{0,15}\\.)?[a-z][a-z0-9_]{0,31}".prop_map(String::from)
}

/// Generate a leaf payload value. Floats are left out so equality is exact.
pub fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        ".{0,32}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
    ]
}

/// Generate a nested value up to a few levels deep.
pub fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z_]{1,12}", inner), 0..6).prop_map(|entries| {
                Value::Map(
                    entries
                        .into_iter()
                        .map(|(k, v)| (Value::Text(k), v))
                        .collect(),
                )
            }),
        ]
    })
}

/// Generate a call payload: a map with text keys.
pub fn payload() -> impl Strategy<Value = Value> {
    prop::collection::vec(("[a-z_]{1,12}", value()), 0..8).prop_map(|entries| {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::Text(k), v))
                .collect(),
        )
    })
}

/// Requested capabilities for a new PAR.
#[derive(Debug, Clone)]
pub struct CapabilityParams {
    pub readable: bool,
    pub writeable: bool,
    pub executable: bool,
    pub object_key: Option<String>,
    /// Seconds from now until expiry; negative means already expired.
    pub expires_in: i64,
}

impl Arbitrary for CapabilityParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            proptest::option::of("[a-z0-9/._-]{1,24}"),
            -3_600i64..=86_400i64,
        )
            .prop_map(
                |(readable, writeable, executable, object_key, expires_in)| CapabilityParams {
                    readable,
                    writeable,
                    executable,
                    object_key,
                    expires_in,
                },
            )
            .boxed()
    }
}

impl CapabilityParams {
    /// A builder requesting exactly these capabilities.
    pub fn builder(&self, url: &str) -> acquire_par::ParBuilder {
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(self.expires_in);
        let mut builder = acquire_par::ParBuilder::new(url, expires_at);
        if let Some(key) = &self.object_key {
            builder = builder.object(key.clone());
        }
        if self.readable {
            builder = builder.readable();
        }
        if self.writeable {
            builder = builder.writeable();
        }
        if self.executable {
            builder = builder.executable();
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquire_core::{Classify, ErrorKind};
    use acquire_envelope::{pack_arguments, unpack_arguments, PackOptions, UnpackOptions};
    use acquire_par::{ParError, ParKind};
    use chrono::{Duration, Utc};

    const URL: &str = "https://objstore.example/b/prop";

    proptest! {
        #[test]
        fn test_plain_roundtrip(f in function_name(), p in payload()) {
            let bytes = pack_arguments(&f, p.clone(), &PackOptions::new()).unwrap();
            let call = unpack_arguments(&bytes, &UnpackOptions::new()).unwrap().unwrap();

            prop_assert_eq!(call.function.as_deref(), Some(f.as_str()));
            prop_assert_eq!(call.args, p);
            prop_assert!(call.hints.is_empty());
        }

        #[test]
        fn test_encrypt_roundtrip(
            f in function_name(),
            p in payload(),
            key in private_key(),
        ) {
            let public = key.public_key();
            let opts = PackOptions::new().encrypt_for(&public);
            let bytes = pack_arguments(&f, p.clone(), &opts).unwrap();
            let call = unpack_arguments(&bytes, &UnpackOptions::new().decrypt_with(&key))
                .unwrap()
                .unwrap();

            prop_assert_eq!(call.function.as_deref(), Some(f.as_str()));
            prop_assert_eq!(call.args, p);
        }

        #[test]
        fn test_fingerprint_mismatch(
            p in payload(),
            key in private_key(),
            other in private_key(),
        ) {
            prop_assume!(key.fingerprint() != other.fingerprint());

            let public = key.public_key();
            let bytes = pack_arguments("f", p, &PackOptions::new().encrypt_for(&public)).unwrap();
            let err = unpack_arguments(&bytes, &UnpackOptions::new().decrypt_with(&other))
                .unwrap_err();

            prop_assert_eq!(err.kind(), ErrorKind::KeyResolution);
        }

        #[test]
        fn test_seconds_remaining_monotonic(
            params: CapabilityParams,
            t1 in 0i64..100_000,
            dt in 0i64..100_000,
            buffer in -60.0f64..120.0,
        ) {
            let key = PrivateKey::from_bytes([1; 32]);
            let mut params = params;
            params.readable = true;
            let par = params.builder(URL).build(&key.public_key()).unwrap();

            let now = Utc::now();
            let earlier = par.seconds_remaining_at(now + Duration::seconds(t1), buffer);
            let later = par.seconds_remaining_at(now + Duration::seconds(t1 + dt), buffer);

            prop_assert!(earlier >= later);
            prop_assert!(later >= 0.0);
        }

        #[test]
        fn test_capability_invariant(params: CapabilityParams) {
            let key = PrivateKey::from_bytes([2; 32]);
            let result = params.builder(URL).build(&key.public_key());

            if params.executable {
                let par = result.unwrap();
                prop_assert!(par.is_executable());
                prop_assert!(!par.is_readable());
                prop_assert!(!par.is_writeable());
                prop_assert_eq!(par.kind(), Some(ParKind::Calculation));
            } else if params.readable || params.writeable {
                let par = result.unwrap();
                prop_assert_eq!(par.is_readable(), params.readable);
                prop_assert_eq!(par.is_writeable(), params.writeable);
                let expected = if params.object_key.is_some() {
                    ParKind::Object
                } else {
                    ParKind::Bucket
                };
                prop_assert_eq!(par.kind(), Some(expected));
            } else {
                let err = result.unwrap_err();
                prop_assert!(matches!(err, ParError::Permission(_)));
                prop_assert_eq!(err.kind(), ErrorKind::Permission);
            }
        }

        #[test]
        fn test_par_bytes_roundtrip(params: CapabilityParams) {
            let key = PrivateKey::from_bytes([3; 32]);
            let mut params = params;
            if !(params.readable || params.writeable || params.executable) {
                params.writeable = true;
            }
            let par = params.builder(URL).build(&key.public_key()).unwrap();

            let restored = acquire_par::Par::from_bytes(&par.to_bytes()).unwrap();
            prop_assert_eq!(restored.uid(), par.uid());
            prop_assert_eq!(restored.kind(), par.kind());
            prop_assert_eq!(restored.key(), par.key());
            prop_assert_eq!(restored.expires_at(), par.expires_at());
        }
    }
}
