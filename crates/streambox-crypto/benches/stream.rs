use std::io::Read;

use streambox_crypto::{decrypt, encrypt, generate_key};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_stream(bencher: divan::Bencher, size: usize) {
    let key = generate_key();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size + size / 256 + 64);
            encrypt(divan::black_box(&key), divan::black_box(&data[..]))
                .read_to_end(&mut out)
                .unwrap();
            out
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_stream(bencher: divan::Bencher, size: usize) {
    let key = generate_key();
    let data = make_data(size);
    let mut encrypted = Vec::new();
    encrypt(&key, &data[..]).read_to_end(&mut encrypted).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size);
            decrypt(divan::black_box(&key), divan::black_box(&encrypted[..]))
                .read_to_end(&mut out)
                .unwrap();
            out
        });
}

#[divan::bench(args = [1, 512, 65536])]
fn bench_decrypt_read_size(bencher: divan::Bencher, read_size: usize) {
    let key = generate_key();
    let data = make_data(256 * 1024);
    let mut encrypted = Vec::new();
    encrypt(&key, &data[..]).read_to_end(&mut encrypted).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(data.len()))
        .bench(|| {
            let mut reader = decrypt(&key, divan::black_box(&encrypted[..]));
            let mut buf = vec![0u8; read_size];
            let mut total = 0;
            loop {
                let n = reader.read(&mut buf).unwrap();
                if n == 0 {
                    break total;
                }
                total += n;
            }
        });
}

fn main() {
    divan::main();
}
