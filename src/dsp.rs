//! Allocation-free vector math shared by the channel synchronizer and the combiner:
//! moduli, arguments, median, and phase/amplitude compensation. Kept separate from
//! [`crate::channel`] and [`crate::combiner`] so the hot combine path never has to
//! reason about channel bookkeeping, only plain numbers.

use num_complex::Complex64;

/// `|z|`.
#[inline]
pub fn modulus(z: Complex64) -> f64 {
    z.norm()
}

/// `arg(z)`, the principal value in `(-pi, pi]`.
#[inline]
pub fn argument(z: Complex64) -> f64 {
    z.arg()
}

/// Median of a slice of real values. Copies into a scratch `Vec` and sorts it; not
/// meant for the innermost per-sample loop, only for the once-per-onset statistics in
/// [`crate::channel`].
///
/// # Panics
///
/// Panics if `values` is empty.
pub fn median(values: &[f64]) -> f64 {
    assert!(!values.is_empty(), "median of an empty slice");
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("NaN in median input"));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median of `|z|` over `samples`.
pub fn median_modulus(samples: &[Complex64]) -> f64 {
    let moduli: Vec<f64> = samples.iter().copied().map(modulus).collect();
    median(&moduli)
}

/// Mean of `|z|` over `samples`.
///
/// # Panics
///
/// Panics if `samples` is empty.
pub fn mean_modulus(samples: &[Complex64]) -> f64 {
    assert!(!samples.is_empty(), "mean of an empty slice");
    samples.iter().copied().map(modulus).sum::<f64>() / samples.len() as f64
}

/// Robust phase-delta estimate between two aligned sample tails: the median, over
/// matching indices, of `arg(reference[k]) - arg(auxiliary[k])`. The shorter of the two
/// tails bounds the comparison.
///
/// # Panics
///
/// Panics if either tail is empty.
pub fn median_phase_delta(reference_tail: &[Complex64], auxiliary_tail: &[Complex64]) -> f64 {
    let len = reference_tail.len().min(auxiliary_tail.len());
    assert!(len > 0, "phase delta needs at least one sample pair");
    let deltas: Vec<f64> = (0..len)
        .map(|k| argument(reference_tail[k]) - argument(auxiliary_tail[k]))
        .collect();
    median(&deltas)
}

/// `g * z * e^{i*phi}`: scale `z` by gain `g` and rotate it by `phi` radians.
#[inline]
pub fn compensate(z: Complex64, gain: f64, phase: f64) -> Complex64 {
    let (sin_p, cos_p) = phase.sin_cos();
    let rotation = Complex64::new(cos_p, sin_p);
    z * gain * rotation
}

/// Adds `compensate(src[i], gain, phase)` into `dst[i]` for every `i`, in place.
/// `dst` and `src` must have equal length; this is the inner loop of the combiner and
/// performs no allocation.
pub fn accumulate_compensated(dst: &mut [Complex64], src: &[Complex64], gain: f64, phase: f64) {
    debug_assert_eq!(dst.len(), src.len());
    let (sin_p, cos_p) = phase.sin_cos();
    let rotation = Complex64::new(cos_p, sin_p);
    let factor = rotation * gain;
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d += *s * factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn median_odd_length() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
    }

    #[test]
    fn median_even_length() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }

    #[test]
    fn median_single_value() {
        assert_eq!(median(&[42.0]), 42.0);
    }

    #[test]
    fn compensate_preserves_modulus_scaled_by_gain() {
        let z = Complex64::new(3.0, 4.0);
        let out = compensate(z, 2.0, 0.3);
        assert!((modulus(out) - 2.0 * modulus(z)).abs() < 1e-12);
    }

    #[test]
    fn compensate_rotates_argument_by_phase() {
        let z = Complex64::new(1.0, 0.0);
        let out = compensate(z, 1.0, PI / 4.0);
        assert!((argument(out) - PI / 4.0).abs() < 1e-12);
    }

    #[test]
    fn compensate_zero_gain_is_zero() {
        let z = Complex64::new(5.0, -2.0);
        let out = compensate(z, 0.0, 1.0);
        assert_eq!(out, Complex64::new(0.0, 0.0));
    }

    #[test]
    fn accumulate_matches_scalar_compensate() {
        let src = vec![Complex64::new(1.0, 1.0), Complex64::new(-1.0, 2.0)];
        let mut dst = vec![Complex64::new(0.0, 0.0); 2];
        accumulate_compensated(&mut dst, &src, 1.5, 0.2);
        for i in 0..2 {
            let expected = compensate(src[i], 1.5, 0.2);
            assert!((dst[i] - expected).norm() < 1e-12);
        }
    }

    #[test]
    fn accumulate_adds_into_existing_values() {
        let src = vec![Complex64::new(1.0, 0.0)];
        let mut dst = vec![Complex64::new(2.0, 0.0)];
        accumulate_compensated(&mut dst, &src, 1.0, 0.0);
        assert!((dst[0] - Complex64::new(3.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn mean_modulus_of_constant_magnitude() {
        let samples = vec![Complex64::new(3.0, 4.0), Complex64::new(0.0, 5.0)];
        assert!((mean_modulus(&samples) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn median_phase_delta_constant_offset() {
        let reference_tail = vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(0.0, 1.0),
            Complex64::new(-1.0, 0.0),
        ];
        let auxiliary_tail: Vec<Complex64> = reference_tail
            .iter()
            .map(|z| compensate(*z, 1.0, -PI / 6.0))
            .collect();
        let delta = median_phase_delta(&reference_tail, &auxiliary_tail);
        assert!((delta - PI / 6.0).abs() < 1e-9);
    }
}
