//! Per-channel connection handler: registers the slot, frames incoming samples off the
//! wire, and hands decoded batches to the worker thread.

use crate::error::{ServerError, ServerResult};
use crate::protocol::{self, CHANNEL_FRAME_HEADER_LEN};
use crate::registry::ChannelRegistry;
use crate::worker::{WorkItem, WorkSender};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

/// Drives one channel connection to completion: claims the registry slot, reads framed
/// batches until EOF or a protocol error, then releases the slot. Errors are logged here
/// and never propagated — a bad channel connection only ever affects itself.
pub async fn run(
    channel_id: u8,
    mut stream: TcpStream,
    registry: Arc<ChannelRegistry>,
    work_tx: WorkSender,
    max_recv: usize,
) {
    if !registry.claim(channel_id) {
        log::warn!("{}", ServerError::SlotBusy(channel_id));
        return;
    }
    log::info!("channel {channel_id} connected");

    match ingress_loop(channel_id, &mut stream, &work_tx, max_recv).await {
        Ok(()) => log::info!("channel {channel_id} disconnected"),
        Err(err) => log::warn!("channel {channel_id} connection ended: {err}"),
    }

    registry.release(channel_id);
}

async fn ingress_loop(
    channel_id: u8,
    stream: &mut TcpStream,
    work_tx: &WorkSender,
    max_recv: usize,
) -> ServerResult<()> {
    loop {
        let mut header_bytes = [0u8; CHANNEL_FRAME_HEADER_LEN];
        if !super::read_exact_or_eof(stream, &mut header_bytes).await? {
            return Ok(());
        }
        let header = protocol::decode_channel_frame_header(&header_bytes);

        let mut payload = vec![0u8; header.payload_len as usize];
        read_payload(stream, &mut payload, max_recv).await?;

        if header.saturation {
            log::warn!("channel {channel_id} reported a saturated sample");
        }

        let samples = protocol::decode_iq_payload(&payload)?;
        let item = WorkItem {
            channel_id,
            samples,
            saturation: header.saturation,
        };
        if work_tx.send(item).await.is_err() {
            // Worker has shut down; stop accepting further batches.
            return Ok(());
        }
    }
}

/// Reads the frame payload in chunks no larger than `max_recv` bytes per syscall. Unlike
/// the header read, a zero-byte read here is always a protocol violation: the header
/// already promised this many payload bytes were coming.
async fn read_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    max_recv: usize,
) -> ServerResult<()> {
    let mut total = 0;
    while total < buf.len() {
        let end = (total + max_recv).min(buf.len());
        let n = reader.read(&mut buf[total..end]).await?;
        if n == 0 {
            return Err(ServerError::PeerClosed);
        }
        total += n;
    }
    Ok(())
}
