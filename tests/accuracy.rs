use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use sllb::{Error, Sketch};

fn within(est: u64, exp: u64, pct: f64) -> bool {
    let offset = pct * exp as f64 / 100.0;
    (est as f64 - exp as f64).abs() <= offset
}

/// Items per timestamp `0..100` with a random count each, plus the sketch built from them.
fn windowed(seed: u8) -> (Sketch, Vec<u64>) {
    let mut rng = StdRng::from_seed([seed; 32]);
    let mut sk = Sketch::new(0.01).unwrap();
    let mut counts = vec![0u64; 100];
    for (i, count) in counts.iter_mut().enumerate() {
        for j in 0..rng.gen_range(1_000, 10_000) {
            let e = format!("e-{}-{}", i, j);
            sk.insert_bytes(i as u64, e.as_bytes());
            *count += 1;
        }
    }
    (sk, counts)
}

#[test]
fn million_items() {
    let mut sk = Sketch::new(0.005).unwrap();
    assert_eq!(sk.num_buckets(), 1 << 16);
    for i in 1..=1_000_000u64 {
        sk.insert_bytes(i, format!("test-{}", i).as_bytes());
    }
    let est = sk.estimate(0);
    assert!(within(est, 1_000_000, 3.0), "{}", est);
    assert_eq!(sk.estimate(1), est);
    let est = sk.estimate(500_001);
    assert!(within(est, 500_000, 3.0), "{}", est);
}

#[test]
fn every_cutoff_is_close() {
    let (sk, counts) = windowed(1);
    for since in 0..counts.len() {
        let exp = counts[since..].iter().sum::<u64>();
        let est = sk.estimate(since as u64);
        assert!(
            within(est, exp, 5.0),
            "{}: expected error <= 5.0% for {}, got {}",
            since,
            exp,
            est
        );
    }
}

#[test]
fn nothing_after_last_timestamp() {
    let (sk, counts) = windowed(2);
    assert_eq!(sk.estimate(counts.len() as u64), 0);
    assert_eq!(sk.estimate(u64::max_value()), 0);
}

#[test]
fn larger_window_counts_more() {
    let (sk, _) = windowed(3);
    let estimates = (0..100).map(|s| sk.estimate(s)).collect::<Vec<_>>();
    for w in estimates.windows(2) {
        assert!(w[0] as f64 >= w[1] as f64 * 0.97, "{:?}", w);
    }
    for w in estimates.windows(10).step_by(10) {
        assert!(w[0] > w[9], "{:?}", w);
    }
}

#[test]
fn duplicates_are_not_counted() {
    let mut sk = Sketch::new(0.01).unwrap();
    for round in 0..5u64 {
        for i in 0..20_000u64 {
            sk.insert(round, i);
        }
    }
    assert!(within(sk.estimate(0), 20_000, 3.0));
    assert!(within(sk.estimate(4), 20_000, 3.0));
    assert_eq!(sk.estimate(5), 0);
}

#[test]
fn out_of_order_timestamps() {
    let mut ordered = Sketch::new(0.02).unwrap();
    let mut shuffled = Sketch::new(0.02).unwrap();
    let mut rng = StdRng::from_seed([4; 32]);
    let mut items = (0..30_000u64).map(|i| (i / 300, i)).collect::<Vec<_>>();
    for &(t, v) in items.iter() {
        ordered.insert(t, v);
    }
    items.shuffle(&mut rng);
    for &(t, v) in items.iter() {
        shuffled.insert(t, v);
    }
    for since in 0..=100 {
        assert_eq!(ordered.estimate(since), shuffled.estimate(since));
    }
}

#[test]
fn frontier_invariant_holds() {
    let (sk, _) = windowed(5);
    for reg in sk.registers() {
        for a in reg {
            for b in reg {
                assert!(
                    !(b.timestamp > a.timestamp && b.precision > a.precision),
                    "{:?} dominates {:?}",
                    b,
                    a
                );
            }
        }
    }
}

#[test]
fn union_answers_like_one_sketch() {
    let mut all = Sketch::new(0.02).unwrap();
    let mut early = Sketch::new(0.02).unwrap();
    let mut late = Sketch::new(0.02).unwrap();
    for i in 0..40_000u64 {
        // Both halves share the items 15_000..25_000.
        let (t, v) = (i / 400, i % 25_000 + (i / 25_000) * 15_000);
        all.insert(t, v);
        if i < 20_000 {
            early.insert(t, v);
        } else {
            late.insert(t, v);
        }
    }
    early.union(&late).unwrap();
    for since in 0..=100 {
        assert_eq!(early.estimate(since), all.estimate(since), "{}", since);
    }
}

#[test]
fn union_requires_same_config() {
    let mut sk = Sketch::new(0.02).unwrap();
    sk.insert(1, "a");
    let before = sk.estimate(0);
    let bits = sk.bucket_bits();
    let other = Sketch::new(0.05).unwrap();
    match sk.union(&other) {
        Err(Error::IncompatibleSketch {
            bucket_bits,
            other_bucket_bits,
            ..
        }) => {
            assert_eq!(bucket_bits, bits);
            assert_eq!(other_bucket_bits, other.bucket_bits());
        }
        res => panic!("expected IncompatibleSketch, got {:?}", res),
    }
    assert_eq!(sk.estimate(0), before);
}

#[test]
fn construction_validation() {
    for rate in [0.0, 1.0, -0.1, 1.5].iter() {
        assert!(
            matches!(Sketch::new(*rate), Err(Error::InvalidParameter(_))),
            "{}",
            rate
        );
    }
    let sk = Sketch::new(0.05).unwrap();
    assert_eq!(sk.bucket_bits(), 9);
    assert!((sk.standard_error() - 1.04 / (512f64).sqrt()).abs() < 1e-12);
}
