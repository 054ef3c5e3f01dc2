//! The single dedicated worker thread.
//!
//! Owns every [`ChannelState`] and the [`Combiner`] for the lifetime of the process.
//! Async connection tasks never touch channel state directly; they submit decoded
//! batches through a bounded [`tokio::sync::mpsc`] channel and the worker applies them
//! in receive order, one at a time, on a plain OS thread that never awaits. This is what
//! gives per-channel ordering and reference-channel serialization without a mutex around
//! the channel state itself (see the concurrency notes on [`crate::combiner`]).

use crate::channel::ChannelState;
use crate::combiner::{CombinedPacket, Combiner};
use num_complex::Complex64;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, watch};

/// One decoded batch submitted by a channel-ingress task.
pub struct WorkItem {
    pub channel_id: u8,
    pub samples: Vec<Complex64>,
    pub saturation: bool,
}

/// Handle used by channel-ingress tasks to submit work; cloned per connection.
pub type WorkSender = mpsc::Sender<WorkItem>;

/// Spawns the worker thread and returns its join handle alongside the sender connection
/// tasks use to submit batches. Dropping every clone of the returned sender causes the
/// worker to drain its queue and exit, so shutdown is just "stop sending and join".
pub fn spawn(
    channel_amount: u8,
    packet_size: usize,
    carrier_threshold: f64,
    phase_shift_rx: watch::Receiver<Arc<Vec<f64>>>,
    output_tx: mpsc::Sender<CombinedPacket>,
    work_queue_capacity: usize,
) -> (JoinHandle<()>, WorkSender) {
    let (work_tx, work_rx) = mpsc::channel(work_queue_capacity);
    let handle = std::thread::Builder::new()
        .name("ils-worker".to_string())
        .spawn(move || run(channel_amount, packet_size, carrier_threshold, phase_shift_rx, output_tx, work_rx))
        .expect("failed to spawn worker thread");
    (handle, work_tx)
}

fn run(
    channel_amount: u8,
    packet_size: usize,
    carrier_threshold: f64,
    phase_shift_rx: watch::Receiver<Arc<Vec<f64>>>,
    output_tx: mpsc::Sender<CombinedPacket>,
    mut work_rx: mpsc::Receiver<WorkItem>,
) {
    let mut channels: Vec<ChannelState> = (0..channel_amount)
        .map(|id| {
            if id == 0 {
                ChannelState::new_reference()
            } else {
                ChannelState::new_auxiliary(id)
            }
        })
        .collect();
    let mut combiner = Combiner::new(packet_size, channel_amount as usize);

    while let Some(item) = work_rx.blocking_recv() {
        if item.saturation {
            log::warn!("channel {} reported a saturated sample in this batch", item.channel_id);
        }
        process_item(&mut channels, &mut combiner, &phase_shift_rx, &output_tx, carrier_threshold, item);
    }

    log::info!("worker thread exiting: no more channel-ingress senders remain");
}

fn process_item(
    channels: &mut [ChannelState],
    combiner: &mut Combiner,
    phase_shift_rx: &watch::Receiver<Arc<Vec<f64>>>,
    output_tx: &mpsc::Sender<CombinedPacket>,
    carrier_threshold: f64,
    item: WorkItem,
) {
    let channel_id = item.channel_id as usize;
    if channel_id == 0 {
        let was_found = channels[0].core().start_found;
        channels[0].process_reference_buffer(&item.samples, carrier_threshold);
        if !was_found && channels[0].core().start_found {
            log::info!("carrier onset found on reference channel 0 at index {}", channels[0].core().start_at);
        }

        let shift = phase_shift_rx.borrow().clone();
        for packet in combiner.combine(channels, &shift) {
            if output_tx.blocking_send(packet).is_err() {
                log::debug!("controller output channel closed; dropping combined packet");
                break;
            }
        }
    } else {
        let (reference_slice, rest) = channels.split_at_mut(channel_id);
        let reference = reference_slice[0].core();
        let auxiliary = &mut rest[0];

        let was_synchronised = auxiliary.core().synchronised;
        auxiliary.process_auxiliary_buffer(&item.samples, reference, carrier_threshold);
        if !was_synchronised && auxiliary.core().synchronised {
            let core = auxiliary.core();
            log::info!(
                "channel {} locked: level={:.6} phase_delta={:.6} rad offset={} start_at={}",
                core.id, core.level, core.phase_delta, core.offset, core.start_at
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpx(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn processing_reference_then_auxiliary_batch_locks_and_emits_nothing_below_packet_size() {
        let mut channels = vec![ChannelState::new_reference(), ChannelState::new_auxiliary(1)];
        let mut combiner = Combiner::new(4, 2);
        let (phase_tx, phase_rx) = watch::channel(Arc::new(vec![0.0, 0.0]));
        let (output_tx, mut output_rx) = mpsc::channel(8);

        process_item(
            &mut channels,
            &mut combiner,
            &phase_rx,
            &output_tx,
            1000.0,
            WorkItem { channel_id: 0, samples: vec![cpx(1500.0, 0.0); 4], saturation: false },
        );
        process_item(
            &mut channels,
            &mut combiner,
            &phase_rx,
            &output_tx,
            1000.0,
            WorkItem {
                channel_id: 1,
                samples: vec![cpx(0.0, 0.0), cpx(0.0, 0.0), cpx(1500.0, 0.0), cpx(1500.0, 0.0)],
                saturation: false,
            },
        );

        assert!(channels[1].core().synchronised);
        assert!(output_rx.try_recv().is_err());
        drop(phase_tx);
    }
}
