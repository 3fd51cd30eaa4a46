use rand::Rng;
use sllb::Sketch;

use std::collections;

fn main() {
    for k in 3..6 {
        let k = 10u64.pow(k);
        println!(
            r#"

#### Max items per timestamp {}
Since|Exact|Estimate|Error|
-----|-----|--------|-----|"#,
            k
        );

        let mut rng = rand::thread_rng();
        let mut sk = Sketch::default();
        // Latest timestamp at which each item was seen.
        let mut latest = collections::HashMap::<u64, u64>::new();
        for t in 0..100 {
            for _ in 0..rng.gen_range(1, k) {
                let item = rng.gen_range(0, 50 * k);
                latest.insert(item, t);
                sk.insert(t, item);
            }
        }

        for since in (0..100).step_by(20) {
            let exact = latest.values().filter(|t| **t >= since).count() as u64;
            let est = sk.estimate(since);
            println!(
                "{0}|{1}|{2}|{3:.2}%",
                since,
                exact,
                est,
                (est as f64 - exact as f64) / exact.max(1) as f64 * 100.0
            );
        }
    }
}
