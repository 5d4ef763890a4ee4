use criterion::{criterion_group, criterion_main, Criterion};
use tiered_list::{FillLevel, List, Value};

fn push_tail(c: &mut Criterion) {
    for fill in [0u8, 5, 8] {
        let mut list = List::new(FillLevel::new(fill), 0);
        let mut i = 0i64;

        c.bench_function(&format!("push tail (fill level {fill})"), |b| {
            b.iter(|| {
                list.push_tail(Value::Int(i));
                i += 1;
            });
        });
    }
}

fn random_index(c: &mut Criterion) {
    use rand::Rng;

    let mut list = List::new(FillLevel::new(5), 0);

    for i in 0..100_000i64 {
        list.push_tail(Value::Int(i));
    }

    let mut rng = rand::rng();

    c.bench_function("random index in 100k entries", |b| {
        b.iter(|| {
            let i = rng.random_range(0..100_000isize);
            assert!(list.get(i).is_some());
        });
    });
}

fn full_iteration(c: &mut Criterion) {
    let mut list = List::new(FillLevel::new(5), 0);

    for i in 0..100_000i64 {
        list.push_tail(Value::Int(i));
    }

    c.bench_function("iterate 100k entries", |b| {
        b.iter(|| {
            assert_eq!(100_000, list.iter().count());
        });
    });
}

fn xof_encode(c: &mut Criterion) {
    let values: Vec<f64> = (0..10_000).map(|i| 20.0 + f64::from(i) * 0.05).collect();

    c.bench_function("xof encode 10k doubles", |b| {
        b.iter(|| {
            let mut enc = tiered_list::xof::Encoder::new();
            for &v in &values {
                enc.push(v);
            }
            enc.finish()
        });
    });

    let mut enc = tiered_list::xof::Encoder::new();
    for &v in &values {
        enc.push(v);
    }
    let stream = enc.finish();

    c.bench_function("xof decode 10k doubles", |b| {
        b.iter(|| {
            assert_eq!(10_000, stream.iter().count());
        });
    });
}

criterion_group!(benches, push_tail, random_index, full_iteration, xof_encode,);
criterion_main!(benches);
