//! Per-channel state.
//!
//! A [`ChannelState`] is a tagged variant over a shared [`ChannelCore`] record: the
//! reference channel (id 0) and every auxiliary channel carry the same fields, but the
//! reference tracks its own carrier onset while an auxiliary locks onto the reference's.
//! Dispatch between the two happens in [`ChannelState::process_buffer`]; the lock
//! algorithm itself lives in [`sync`].

pub mod sync;

use crate::dsp;
use num_complex::Complex64;
use std::collections::VecDeque;

/// Fields shared by both channel variants. See the module docs for the invariants that
/// distinguish a reference core from an auxiliary one.
#[derive(Debug, Clone)]
pub struct ChannelCore {
    pub id: u8,
    pub buffer: VecDeque<Complex64>,
    pub start_found: bool,
    pub start_at: usize,
    pub synchronised: bool,
    pub level: f64,
    pub phase_delta: f64,
    pub offset: i64,
    pub median: f64,
}

impl ChannelCore {
    fn new(id: u8) -> Self {
        Self {
            id,
            buffer: VecDeque::new(),
            start_found: false,
            start_at: 0,
            synchronised: false,
            level: 1.0,
            phase_delta: 0.0,
            offset: 0,
            median: 0.0,
        }
    }

    /// Number of complex samples currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if no samples have been buffered yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends `samples` to the tail of the buffer.
    pub fn put(&mut self, samples: &[Complex64]) {
        self.buffer.extend(samples.iter().copied());
    }

    /// `|buffer.last()|`, or `None` if the buffer is empty.
    pub fn last_modulus(&self) -> Option<f64> {
        self.buffer.back().copied().map(dsp::modulus)
    }

    /// Removes and returns the first `count` samples, for the combiner's per-packet
    /// buffer trim. `count` must not exceed [`ChannelCore::len`].
    pub fn drain_front(&mut self, count: usize) -> Vec<Complex64> {
        self.buffer.drain(..count).collect()
    }

    /// Scans the buffer for the single sample whose modulus is both the maximum in the
    /// buffer and strictly greater than `carrier_threshold`. A no-op if the onset has
    /// already been found, or if no sample clears the threshold. Ties are broken by
    /// earliest index because later candidates must strictly exceed the current best.
    pub fn find_start(&mut self, carrier_threshold: f64) {
        if self.start_found {
            return;
        }

        let mut best_index = None;
        let mut best_modulus = carrier_threshold;
        for (index, sample) in self.buffer.iter().enumerate() {
            let candidate = dsp::modulus(*sample);
            if candidate > best_modulus {
                best_modulus = candidate;
                best_index = Some(index);
            }
        }

        if let Some(start_at) = best_index {
            let tail: Vec<Complex64> = self.buffer.iter().skip(start_at).copied().collect();
            self.median = dsp::median_modulus(&tail);
            self.start_at = start_at;
            self.start_found = true;
        }
    }

    /// Returns the pending time-realignment offset and resets it to zero. Meant to be
    /// consumed exactly once, by the first batch processed after the channel locks.
    pub fn get_index_to_sync(&mut self) -> i64 {
        std::mem::take(&mut self.offset)
    }
}

/// Tagged channel state: the reference channel defines the time/amplitude/phase frame
/// that every auxiliary channel locks onto.
#[derive(Debug, Clone)]
pub enum ChannelState {
    Reference(ChannelCore),
    Auxiliary(ChannelCore),
}

impl ChannelState {
    /// Builds the reference channel (id 0), locked to itself from creation per the
    /// invariants in the data model: `level = 1`, `phase_delta = 0`, `offset = 0`,
    /// `synchronised = true`.
    pub fn new_reference() -> Self {
        let mut core = ChannelCore::new(0);
        core.synchronised = true;
        ChannelState::Reference(core)
    }

    /// Builds an auxiliary channel with the given non-zero id.
    pub fn new_auxiliary(id: u8) -> Self {
        ChannelState::Auxiliary(ChannelCore::new(id))
    }

    pub fn core(&self) -> &ChannelCore {
        match self {
            ChannelState::Reference(core) | ChannelState::Auxiliary(core) => core,
        }
    }

    pub fn core_mut(&mut self) -> &mut ChannelCore {
        match self {
            ChannelState::Reference(core) | ChannelState::Auxiliary(core) => core,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, ChannelState::Reference(_))
    }

    /// Processes one newly-decoded batch of samples for the reference channel.
    ///
    /// Appends to the buffer, then looks for the carrier onset if it hasn't been found
    /// yet. If it has, and the mean modulus of *this* incoming batch drops below half
    /// the carrier threshold, the onset is considered lost and `start_found` is cleared
    /// so a future batch can re-acquire it. Channels already locked onto this reference
    /// stay locked regardless.
    pub fn process_reference_buffer(&mut self, samples: &[Complex64], carrier_threshold: f64) {
        let core = match self {
            ChannelState::Reference(core) => core,
            ChannelState::Auxiliary(_) => {
                debug_assert!(false, "process_reference_buffer called on an auxiliary channel");
                return;
            }
        };

        core.put(samples);
        if !core.start_found {
            core.find_start(carrier_threshold);
        } else if !samples.is_empty() && dsp::mean_modulus(samples) < carrier_threshold / 2.0 {
            core.start_found = false;
        }
    }

    /// Processes one newly-decoded batch of samples for an auxiliary channel, given the
    /// current reference core for comparison.
    ///
    /// Already-locked channels consume their pending [`ChannelCore::offset`] against
    /// this batch (dropping or zero-padding samples as described by the offset's sign)
    /// before buffering it. Unlocked channels simply buffer and attempt to lock.
    pub fn process_auxiliary_buffer(
        &mut self,
        samples: &[Complex64],
        reference: &ChannelCore,
        carrier_threshold: f64,
    ) {
        let core = match self {
            ChannelState::Auxiliary(core) => core,
            ChannelState::Reference(_) => {
                debug_assert!(false, "process_auxiliary_buffer called on the reference channel");
                return;
            }
        };

        if core.synchronised {
            let offset = core.get_index_to_sync();
            push_with_offset(core, samples, offset);
        } else {
            core.put(samples);
            sync::attempt_lock(core, reference, carrier_threshold);
        }
    }
}

fn push_with_offset(core: &mut ChannelCore, samples: &[Complex64], offset: i64) {
    match offset.cmp(&0) {
        std::cmp::Ordering::Greater => {
            let drop_count = (offset as usize).min(samples.len());
            core.put(&samples[drop_count..]);
        }
        std::cmp::Ordering::Less => {
            let pad = (-offset) as usize;
            core.buffer
                .extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(pad));
            core.put(samples);
        }
        std::cmp::Ordering::Equal => core.put(samples),
    }
}
