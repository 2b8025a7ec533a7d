use approx::assert_abs_diff_eq;
use biascan::clusters::OutlierPolicy;
use biascan::config::ScanConfig;
use biascan::data::load_records;
use biascan::optim::{BisectionConfig, BisectionError, RootSearch};
use biascan::scan::{best_cluster, scan_clusters};
use biascan::subset::SubsetAggregate;
use biascan::{Bernoulli, Direction, ScoreError, ScoringFunction};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Bernoulli as Coin, Distribution};
use std::io::Write;
use tempfile::{NamedTempFile, tempdir};

/// Probabilities in `(0.05, 0.95)` with outcomes drawn after scaling the odds by `shift`.
fn simulate(rng: &mut StdRng, n: usize, shift: f64) -> (Array1<f64>, Array1<f64>) {
    let probabilities = Array1::from_shape_fn(n, |_| rng.gen_range(0.05..0.95));
    let outcomes = probabilities.mapv(|p| {
        let shifted = shift * p / (1.0 - p + shift * p);
        if Coin::new(shifted).unwrap().sample(rng) {
            1.0
        } else {
            0.0
        }
    });
    (outcomes, probabilities)
}

fn log_grid(lo: f64, hi: f64, points: usize) -> Vec<f64> {
    let (a, b) = (lo.ln(), hi.ln());
    (0..points)
        .map(|i| (a + (b - a) * i as f64 / (points - 1) as f64).exp())
        .collect()
}

#[test]
fn score_is_concave_in_log_q() {
    let mut rng = StdRng::seed_from_u64(7);
    let scorer = Bernoulli::new(Direction::Both);

    for shift in [0.3, 1.0, 2.5] {
        let (outcomes, probabilities) = simulate(&mut rng, 40, shift);
        // the empty-outcome extremes are included: concavity in ln q holds for every Y
        for y in [0.0, outcomes.sum(), 40.0] {
            let grid = log_grid(0.01, 100.0, 60);
            for window in grid.windows(3) {
                let left = scorer.score(y, probabilities.view(), 0.0, window[0]);
                let mid = scorer.score(y, probabilities.view(), 0.0, window[1]);
                let right = scorer.score(y, probabilities.view(), 0.0, window[2]);
                assert!(
                    left + right - 2.0 * mid <= 1e-9,
                    "score is not concave around q={} (Y={y})",
                    window[1]
                );
            }
        }
    }
}

#[test]
fn q_dscore_decreases_in_q() {
    let mut rng = StdRng::seed_from_u64(3);
    let scorer = Bernoulli::new(Direction::Both);
    let (outcomes, probabilities) = simulate(&mut rng, 50, 1.5);
    let y = outcomes.sum();

    let slopes: Vec<f64> = log_grid(1e-4, 1e4, 200)
        .into_iter()
        .map(|q| scorer.q_dscore(y, probabilities.view(), q))
        .collect();
    assert!(slopes.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn q_mle_beats_a_dense_grid_search() {
    let mut rng = StdRng::seed_from_u64(11);
    let scorer = Bernoulli::new(Direction::Both);
    let grid = log_grid(0.05, 20.0, 2000);

    for shift in [0.25, 0.6, 1.0, 1.8, 4.0] {
        let (outcomes, probabilities) = simulate(&mut rng, 60, shift);
        let y = outcomes.sum();
        assert!(y > 0.0 && y < 60.0);

        let q_mle = scorer.qmle(y, probabilities.view()).unwrap();
        let best_on_grid = grid
            .iter()
            .map(|&q| scorer.score(y, probabilities.view(), 0.0, q))
            .fold(f64::NEG_INFINITY, f64::max);

        assert!(scorer.score(y, probabilities.view(), 0.0, q_mle) >= best_on_grid - 1e-9);
        assert_abs_diff_eq!(
            scorer.q_dscore(y, probabilities.view(), q_mle),
            0.0,
            epsilon = 1e-3
        );
    }
}

#[test]
fn compute_qs_roots_are_zeros_of_the_penalized_score() {
    let mut rng = StdRng::seed_from_u64(23);
    let search = BisectionConfig {
        tolerance: 1e-10,
        ..BisectionConfig::default()
    };
    let scorer = Bernoulli::with_search(Direction::Both, search);

    for shift in [0.2, 3.0, 6.0] {
        let (outcomes, probabilities) = simulate(&mut rng, 120, shift);
        let y = outcomes.sum();
        let penalty = 1.5;

        let range = scorer.compute_qs(y, probabilities.view(), penalty).unwrap();
        assert!(range.exists, "shift {shift} should leave a positive region");
        assert!(range.q_min < range.q_mle && range.q_mle < range.q_max);

        for root in [range.q_min, range.q_max] {
            assert_abs_diff_eq!(
                scorer.score(y, probabilities.view(), penalty, root),
                0.0,
                epsilon = 1e-6
            );
        }
        assert!(scorer.score(y, probabilities.view(), penalty, range.q_mle) > 0.0);
    }
}

#[test]
fn direction_filter_keeps_ranges_on_one_side_of_one() {
    let mut rng = StdRng::seed_from_u64(31);
    let positive = Bernoulli::new(Direction::Positive);
    let negative = Bernoulli::new(Direction::Negative);
    let both = Bernoulli::new(Direction::Both);

    for _ in 0..20 {
        let shift = if rng.gen_bool(0.5) { 3.0 } else { 0.33 };
        let (outcomes, probabilities) = simulate(&mut rng, 80, shift);
        let y = outcomes.sum();
        let penalty = 0.5;

        let p = positive.compute_qs(y, probabilities.view(), penalty).unwrap();
        let n = negative.compute_qs(y, probabilities.view(), penalty).unwrap();
        let b = both.compute_qs(y, probabilities.view(), penalty).unwrap();

        if p.exists {
            assert!(p.q_mle >= 1.0 && p.q_min >= 1.0);
        }
        if n.exists {
            assert!(n.q_mle <= 1.0 && n.q_max <= 1.0);
        }
        assert!(!(p.exists && n.exists) || b.q_mle == 1.0);
        if b.exists {
            assert!(p.exists || n.exists);
        }
    }
}

#[test]
fn under_performing_subset_is_found_only_in_directions_that_allow_it() {
    let expectations = Array1::from_elem(10, 0.5);
    let penalty = 0.1;

    let both = Bernoulli::new(Direction::Both)
        .compute_qs(2.0, expectations.view(), penalty)
        .unwrap();
    assert!(both.exists);
    assert_abs_diff_eq!(both.q_mle, 0.25, epsilon = 1e-5);
    assert!(both.q_min < both.q_mle && both.q_max < 1.0);

    let negative = Bernoulli::new(Direction::Negative)
        .compute_qs(2.0, expectations.view(), penalty)
        .unwrap();
    assert_eq!(negative, both);

    let positive = Bernoulli::new(Direction::Positive)
        .compute_qs(2.0, expectations.view(), penalty)
        .unwrap();
    assert!(!positive.exists);
    assert_eq!(positive.q_mle, 1.0);
    assert_eq!((positive.q_min, positive.q_max), (0.0, 0.0));
}

#[test]
fn saturated_subsets_report_an_open_bracket() {
    let expectations = Array1::from_elem(8, 0.4);
    let scorer = Bernoulli::new(Direction::Both);

    for y in [0.0, 8.0] {
        match scorer.compute_qs(y, expectations.view(), 1.0) {
            Err(ScoreError::Bisection(BisectionError::NoSignChange { search, edge })) => {
                assert_eq!(search, RootSearch::QMle);
                assert!(edge <= 1e-6 || edge >= 1e6, "Y={y} stopped at q={edge}");
            }
            other => panic!("Expected NoSignChange for Y={y}, got {other:?}"),
        }
    }

    // one record short of saturation still has finite roots
    let range = scorer.compute_qs(7.0, expectations.view(), 1.0).unwrap();
    assert!(range.exists);
    assert!(range.q_max < 1e6);
    assert_abs_diff_eq!(
        scorer.score(7.0, expectations.view(), 1.0, range.q_max),
        0.0,
        epsilon = 1e-4
    );
}

#[test]
fn shared_scorer_reuses_its_caches() {
    let mut rng = StdRng::seed_from_u64(5);
    let scorer = Bernoulli::new(Direction::Both);
    let (outcomes, probabilities) = simulate(&mut rng, 30, 2.0);
    let subset =
        SubsetAggregate::from_selection(outcomes.view(), probabilities.view(), |i| i % 3 != 0)
            .unwrap();

    let first = scorer
        .compute_qs(subset.observed_sum, subset.expectations.view(), 0.2)
        .unwrap();
    let before = scorer.cache_hits();
    let second = scorer
        .compute_qs(subset.observed_sum, subset.expectations.view(), 0.2)
        .unwrap();
    let after = scorer.cache_hits();

    assert_eq!(first, second);
    assert_eq!(after.compute_qs, before.compute_qs + 1);
    assert_eq!(after.qmle, before.qmle);
    assert_eq!(after.score, before.score);
}

#[test]
fn scan_of_a_tsv_file_finds_the_shifted_cluster() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "outcome\tprobability\tcluster").unwrap();
    for cluster in [-1_i64, 0, 1, 2, 3] {
        let shift = if cluster == 2 { 4.0 } else { 1.0 };
        let (outcomes, probabilities) = simulate(&mut rng, 200, shift);
        for (y, p) in outcomes.iter().zip(probabilities.iter()) {
            writeln!(file, "{y}\t{p}\t{cluster}").unwrap();
        }
    }
    file.flush().unwrap();

    let dir = tempdir().unwrap();
    let config_path = dir.path().join("scan.toml");
    ScanConfig {
        direction: Direction::Positive,
        penalty: 1.0,
        ..ScanConfig::default()
    }
    .save(&config_path)
    .unwrap();
    let config = ScanConfig::load(&config_path).unwrap();

    let records = load_records(file.path().to_str().unwrap(), config.classification_threshold)
        .unwrap();
    assert_eq!(records.len(), 1000);

    let scores = scan_clusters(&records, &config).unwrap();
    assert_eq!(scores.len(), 4);
    assert!(scores.iter().all(|s| s.cluster != -1));

    let best = best_cluster(&scores).unwrap();
    assert_eq!(best.cluster, 2);
    assert!(best.range.q_min >= 1.0);
    assert!(best.range.q_min < 4.0 && 4.0 < best.range.q_max);
    assert!(best.score > 10.0);

    let with_outliers = ScanConfig {
        outliers: OutlierPolicy::Include,
        ..config
    };
    assert_eq!(scan_clusters(&records, &with_outliers).unwrap().len(), 5);
}
