use acquire_core::value::text_map;
use acquire_core::{PrivateCert, PrivateKey, Value};
use acquire_envelope::{
    pack_arguments, pack_return_value, success_value, unpack_arguments, unpack_return_value,
    KeyHints, PackOptions, UnpackOptions,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn args() -> Value {
    text_map([
        ("bucket", Value::from("user-data")),
        ("key", Value::from("a/b/c.txt")),
        ("data", Value::Bytes(vec![7u8; 1024])),
    ])
}

fn bench_plain(c: &mut Criterion) {
    c.bench_function("pack_unpack_plain", |b| {
        b.iter(|| {
            let bytes = pack_arguments("get_object", args(), &PackOptions::new()).unwrap();
            black_box(unpack_arguments(&bytes, &UnpackOptions::new()).unwrap());
        })
    });
}

fn bench_sealed(c: &mut Criterion) {
    let service = PrivateKey::generate();
    let service_public = service.public_key();

    c.bench_function("pack_unpack_sealed", |b| {
        b.iter(|| {
            let opts = PackOptions::new().encrypt_for(&service_public);
            let bytes = pack_arguments("get_object", args(), &opts).unwrap();
            let unpack = UnpackOptions::new().decrypt_with(&service);
            black_box(unpack_arguments(&bytes, &unpack).unwrap());
        })
    });
}

fn bench_signed_reply(c: &mut Criterion) {
    let caller = PrivateKey::generate();
    let cert = PrivateCert::generate();
    let public_cert = cert.public_cert();
    let hints = KeyHints {
        response_key: Some(caller.public_key()),
        sign_with: Some(cert.fingerprint()),
    };

    c.bench_function("signed_reply", |b| {
        b.iter(|| {
            let bytes =
                pack_return_value(success_value(Some(args())), &hints, Some(&cert)).unwrap();
            let opts = UnpackOptions::new()
                .decrypt_with(&caller)
                .verify_with(&public_cert);
            black_box(unpack_return_value(&bytes, &opts).unwrap());
        })
    });
}

criterion_group!(benches, bench_plain, bench_sealed, bench_signed_reply);
criterion_main!(benches);
