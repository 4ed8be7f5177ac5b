//! Property checks for absorbance math, ALS and peak detection.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spectro_analysis::{
    compute_absorbance, negative_absorbance_correction, Als, PeakSearch, SpectrumProcessor,
};
use spectro_core::AbsorbanceResult;

fn random_voltages(rng: &mut ChaCha8Rng, n: usize) -> (Vec<f64>, Vec<f64>) {
    let reference = (0..n).map(|_| rng.gen_range(0.01..5.0)).collect();
    let sample = (0..n).map(|_| rng.gen_range(0.01..5.0)).collect();
    (reference, sample)
}

#[test]
fn absorbance_is_log_ratio_for_positive_pairs() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..1000 {
        let r: f64 = rng.gen_range(1e-3..10.0);
        let s: f64 = rng.gen_range(1e-3..10.0);
        let a = compute_absorbance(r, s).value().unwrap();
        assert_eq!(a, (r / s).log10());
    }
}

#[test]
fn corrected_absorbance_is_never_negative() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let (reference, sample) = random_voltages(&mut rng, 500);
    let (r, s) = negative_absorbance_correction(&reference, &sample).unwrap();
    for (ri, si) in r.iter().zip(&s) {
        match compute_absorbance(*ri, *si) {
            AbsorbanceResult::Value(a) => assert!(a >= 0.0, "a={a} r={ri} s={si}"),
            AbsorbanceResult::Invalid => panic!("positive voltages must give a value"),
        }
    }
}

#[test]
fn correction_is_idempotent() {
    let mut rng = ChaCha8Rng::seed_from_u64(13);
    let (reference, sample) = random_voltages(&mut rng, 300);
    let once = negative_absorbance_correction(&reference, &sample).unwrap();
    let twice = negative_absorbance_correction(&once.0, &once.1).unwrap();
    assert_eq!(once, twice);
}

fn gaussian(x: f64, center: f64, width: f64, height: f64) -> f64 {
    height * (-((x - center) / width).powi(2) / 2.0).exp()
}

#[test]
fn als_baseline_stays_under_signal_and_converges() {
    let n = 200;
    let p = 0.01;
    let baseline: Vec<f64> = (0..n).map(|i| 0.2 + 0.002 * i as f64).collect();
    let signal: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64;
            baseline[i] + gaussian(x, 60.0, 4.0, 1.0) + gaussian(x, 140.0, 5.0, 0.6)
        })
        .collect();

    let als = Als {
        lambda: 1e5,
        p,
        max_iter: 100,
        tolerance: 1e-6,
    };
    let fit = als.fit(&signal).unwrap();

    assert!(fit.converged, "last change {}", fit.last_change);
    assert!(fit.last_change < als.tolerance);

    // Smooth fits cross a peak-free signal by a hair on either side, so
    // "under the signal" allows 1% of the trace's dynamic range.
    let (lo, hi) = signal
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let slack = 0.01 * (hi - lo);
    let below = fit
        .baseline
        .iter()
        .zip(&signal)
        .filter(|(z, y)| **z <= **y + slack)
        .count();
    assert!(
        below as f64 >= (1.0 - p) * n as f64,
        "only {below} of {n} points have the baseline under the signal"
    );

    // The fit tracks the true baseline, not the peaks.
    assert!((fit.baseline[60] - baseline[60]).abs() < 0.05);
    assert!((fit.baseline[140] - baseline[140]).abs() < 0.05);
}

#[test]
fn als_is_deterministic() {
    let y: Vec<f64> = (0..80)
        .map(|i| 0.1 + gaussian(i as f64, 40.0, 3.0, 0.5))
        .collect();
    let a = Als::default().fit(&y).unwrap();
    let b = Als::default().fit(&y).unwrap();
    assert_eq!(a, b);
}

#[test]
fn two_separated_peaks_are_both_reported() {
    let wavelengths: Vec<f64> = (0..120).map(|i| 700.0 - 2.5 * i as f64).collect();
    let absorbance: Vec<f64> = (0..120)
        .map(|i| gaussian(i as f64, 30.0, 3.0, 0.8) + gaussian(i as f64, 90.0, 3.0, 0.5))
        .collect();
    let peaks = PeakSearch::with_distance(25)
        .find(&wavelengths, &absorbance)
        .unwrap();
    assert_eq!(peaks.len(), 2);
    assert_eq!(peaks[0].index, 30);
    assert_eq!(peaks[0].wavelength_nm, 625.0);
    assert!((peaks[0].absorbance - 0.8).abs() < 1e-12);
    assert_eq!(peaks[1].index, 90);
    assert_eq!(peaks[1].wavelength_nm, 475.0);
    assert!((peaks[1].absorbance - 0.5).abs() < 1e-12);
}

#[test]
fn global_max_ignores_window() {
    let wavelengths: Vec<f64> = (0..5).map(|i| 500.0 + i as f64).collect();
    let a: Vec<AbsorbanceResult> = [0.0, 0.9, 0.0, 1.0, 0.0]
        .iter()
        .map(|&v| AbsorbanceResult::Value(v))
        .collect();
    let out = SpectrumProcessor::plain(PeakSearch::with_distance(60))
        .process_absorbance(&wavelengths, &a)
        .unwrap();
    assert_eq!(out.peaks.len(), 1);
    let top = out.global_max.unwrap();
    assert_eq!(top.wavelength_nm, 503.0);
    assert_eq!(top.absorbance, 1.0);
}
