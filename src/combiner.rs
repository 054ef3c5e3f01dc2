//! The lock-step cross-channel combiner.
//!
//! Runs on the dedicated worker thread immediately after every reference-channel batch.
//! It never touches the network; it only decides how many aligned samples every
//! synchronized channel has in common, compensates and sums them per beam, and hands
//! finished packets back to the worker for the controller's writer task to send.

use crate::channel::ChannelState;
use crate::dsp;
use num_complex::Complex64;

/// One combined output packet: `beam_count * packet_size` compensated, summed complex
/// samples (beams concatenated), plus whether the phase-shift snapshot used to produce
/// it differs from the one used for the previous packet.
pub struct CombinedPacket {
    pub samples: Vec<Complex64>,
    pub shift_changed: bool,
}

/// Holds the only piece of state the combiner needs across calls: the phase-shift
/// snapshot used for the last packet it emitted, for the shift-changed flag.
pub struct Combiner {
    packet_size: usize,
    previous_shift: Vec<f64>,
}

impl Combiner {
    /// `channel_amount` seeds the initial "previous shift" as an all-zero, single-beam
    /// vector, matching the documented behavior that the first packet's shift-changed
    /// flag compares against an implicit all-zero baseline.
    pub fn new(packet_size: usize, channel_amount: usize) -> Self {
        Self {
            packet_size,
            previous_shift: vec![0.0; channel_amount],
        }
    }

    /// Combines as many `packet_size`-sized blocks as every synchronized channel can
    /// currently supply, removing each block's contribution from the front of every
    /// channel's buffer (synchronized or not — see the buffer invariant on channel
    /// state) as it is produced. `channels` must be ordered by channel id.
    pub fn combine(&mut self, channels: &mut [ChannelState], phase_shift: &[f64]) -> Vec<CombinedPacket> {
        let channel_amount = channels.len();
        if channel_amount == 0 || phase_shift.is_empty() {
            return Vec::new();
        }
        let beam_count = phase_shift.len() / channel_amount;
        if beam_count == 0 {
            return Vec::new();
        }

        let n = channels
            .iter()
            .map(|c| if c.core().synchronised { c.core().len() } else { 0 })
            .min()
            .unwrap_or(0);
        let block_count = n / self.packet_size;

        let mut packets = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            let snapshot = phase_shift.to_vec();
            let mut combined = Vec::with_capacity(beam_count * self.packet_size);

            for beam in 0..beam_count {
                let mut sum = vec![Complex64::new(0.0, 0.0); self.packet_size];
                for (j, channel) in channels.iter().enumerate() {
                    let core = channel.core();
                    let head: Vec<Complex64> =
                        core.buffer.iter().take(self.packet_size).copied().collect();
                    let phase = core.phase_delta + snapshot[beam * channel_amount + j];
                    dsp::accumulate_compensated(&mut sum, &head, core.level, phase);
                }
                combined.extend(sum);
            }

            for channel in channels.iter_mut() {
                channel.core_mut().drain_front(self.packet_size);
            }

            let shift_changed = snapshot != self.previous_shift;
            self.previous_shift = snapshot;
            packets.push(CombinedPacket {
                samples: combined,
                shift_changed,
            });
        }

        packets
    }
}
