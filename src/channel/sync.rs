//! The auxiliary-lock algorithm: given an unlocked auxiliary channel's buffer and the
//! reference channel's buffer, decide whether both are currently carrying carrier and,
//! if so, compute the amplitude/phase/time corrections that lock the auxiliary onto the
//! reference for the rest of the connection's lifetime.

use super::ChannelCore;
use crate::dsp;
use num_complex::Complex64;

/// Attempts to lock `aux` onto `reference`. No-op if `aux` is already synchronised, if
/// the reference hasn't found its own onset yet, or if either channel's most recent
/// sample doesn't currently exceed `carrier_threshold` (the "both streams are hot" gate
/// from the component design). Leaves `aux` untouched on any early return.
pub fn attempt_lock(aux: &mut ChannelCore, reference: &ChannelCore, carrier_threshold: f64) {
    if aux.synchronised || !reference.start_found {
        return;
    }

    let (Some(aux_last), Some(reference_last)) = (aux.last_modulus(), reference.last_modulus())
    else {
        return;
    };
    if aux_last <= carrier_threshold || reference_last <= carrier_threshold {
        return;
    }

    aux.find_start(carrier_threshold);
    if !aux.start_found {
        return;
    }

    let aux_tail: Vec<Complex64> = aux.buffer.iter().skip(aux.start_at).copied().collect();
    let reference_tail: Vec<Complex64> = reference
        .buffer
        .iter()
        .skip(reference.start_at)
        .copied()
        .collect();

    aux.median = dsp::median_modulus(&aux_tail);
    aux.level = reference.median / aux.median;
    aux.phase_delta = dsp::median_phase_delta(&reference_tail, &aux_tail);
    aux.offset = reference.start_at as i64 - aux.start_at as i64;
    aux.synchronised = true;
}
