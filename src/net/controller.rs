//! The single controller connection: announces the channel count, accepts phase-shift
//! vectors, and relays combined output packets.
//!
//! Only one controller may be connected at a time. The currently-attached write half
//! lives behind a mutex shared with the relay task in [`spawn_relay`]; when nobody is
//! connected, combined packets are simply dropped so the worker thread never blocks on
//! a controller that isn't there.

use crate::combiner::CombinedPacket;
use crate::error::ServerResult;
use crate::protocol;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};

type SharedWriter = Arc<Mutex<Option<OwnedWriteHalf>>>;

/// Runs the controller accept loop forever, handling one connection at a time.
pub async fn run_acceptor(
    listener: TcpListener,
    channel_amount: u8,
    phase_shift_tx: watch::Sender<Arc<Vec<f64>>>,
    writer: SharedWriter,
    connected: Arc<AtomicBool>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                accept_one(stream, addr, channel_amount, &phase_shift_tx, &writer, &connected).await
            }
            Err(err) => log::warn!("controller accept error: {err}"),
        }
    }
}

async fn accept_one(
    stream: TcpStream,
    addr: SocketAddr,
    channel_amount: u8,
    phase_shift_tx: &watch::Sender<Arc<Vec<f64>>>,
    writer: &SharedWriter,
    connected: &Arc<AtomicBool>,
) {
    if connected.swap(true, Ordering::SeqCst) {
        log::warn!("rejecting controller connection from {addr}: one is already connected");
        return;
    }

    let (read_half, mut write_half) = stream.into_split();
    if let Err(err) = write_half.write_u8(channel_amount).await {
        log::warn!("failed to greet controller {addr}: {err}");
        connected.store(false, Ordering::SeqCst);
        return;
    }
    log::info!("controller connected from {addr}");
    *writer.lock().await = Some(write_half);

    let phase_shift_tx = phase_shift_tx.clone();
    let writer = writer.clone();
    let connected = connected.clone();
    tokio::spawn(async move {
        if let Err(err) = read_loop(read_half, channel_amount, &phase_shift_tx).await {
            log::info!("controller {addr} disconnected: {err}");
        } else {
            log::info!("controller {addr} disconnected");
        }
        phase_shift_tx
            .send(Arc::new(vec![0.0; channel_amount as usize]))
            .ok();
        *writer.lock().await = None;
        connected.store(false, Ordering::SeqCst);
    });
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    channel_amount: u8,
    phase_shift_tx: &watch::Sender<Arc<Vec<f64>>>,
) -> ServerResult<()> {
    read_phase_shifts(&mut read_half, channel_amount, phase_shift_tx).await
}

/// Generic over the reader so it can be exercised against an in-memory duplex stream in
/// tests without a real `TcpStream`.
async fn read_phase_shifts<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    channel_amount: u8,
    phase_shift_tx: &watch::Sender<Arc<Vec<f64>>>,
) -> ServerResult<()> {
    loop {
        let mut beam_count_bytes = [0u8; 4];
        if !super::read_exact_or_eof(reader, &mut beam_count_bytes).await? {
            return Ok(());
        }
        let beam_count = u32::from_le_bytes(beam_count_bytes);

        let mut payload = vec![0u8; 8 * channel_amount as usize * beam_count as usize];
        reader.read_exact(&mut payload).await?;

        let shifts = protocol::decode_phase_shift_payload(channel_amount, beam_count, &payload)?;
        phase_shift_tx.send(Arc::new(shifts)).ok();
    }
}

/// Spawns the task that drains combined packets from the worker and writes them to
/// whichever controller is currently connected, if any. Returns the shared writer handle
/// for [`run_acceptor`] to populate on connect and clear on disconnect.
pub fn spawn_relay(mut output_rx: mpsc::Receiver<CombinedPacket>) -> SharedWriter {
    let writer: SharedWriter = Arc::new(Mutex::new(None));
    let relay_writer = writer.clone();
    tokio::spawn(async move {
        while let Some(packet) = output_rx.recv().await {
            let encoded = protocol::encode_output_packet(&packet.samples, packet.shift_changed);
            let mut guard = relay_writer.lock().await;
            if let Some(stream) = guard.as_mut() {
                if let Err(err) = stream.write_all(&encoded).await {
                    log::warn!("controller write failed, dropping connection: {err}");
                    *guard = None;
                }
            }
        }
    });
    writer
}
