use criterion::{criterion_group, criterion_main, Criterion};
use discovery_codec::{request::Request, Decoder};

fn encode_decode_join(c: &mut Criterion) {
    let req = Request::Join {
        host: Some("10.0.0.1".into()),
        port: 80,
        group: "web".into(),
        custom_data: Some(vec![0u8; 64]),
    };
    let frame = discovery_codec::encode_request(&req);

    c.bench_function("encode join", |b| {
        b.iter(|| discovery_codec::encode_request(&req))
    });

    c.bench_function("decode join", |b| {
        b.iter(|| Decoder::decode(&frame).unwrap())
    });
}

criterion_group!(benches, encode_decode_join);
criterion_main!(benches);
