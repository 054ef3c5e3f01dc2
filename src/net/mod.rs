//! Async per-connection protocol drivers built on Tokio.
//!
//! Everything in this module lives on the cooperative I/O loop: socket reads/writes,
//! registry mutation, and controller state. None of it touches a [`crate::channel::ChannelState`]
//! directly — decoded batches cross into the worker thread via [`crate::worker::WorkItem`]
//! and combined packets cross back via a plain channel, per the concurrency model.

pub mod channel_ingress;
pub mod controller;

use crate::error::{ServerError, ServerResult};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads exactly `buf.len()` bytes, or returns `Ok(false)` if the peer closed cleanly
/// before any byte of this read arrived. A short read followed by EOF mid-message is a
/// protocol violation, not a clean close, and surfaces as [`ServerError::PeerClosed`].
pub(crate) async fn read_exact_or_eof<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> ServerResult<bool> {
    if buf.is_empty() {
        return Ok(true);
    }
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..]).await?;
        if n == 0 {
            return if total == 0 {
                Ok(false)
            } else {
                Err(ServerError::PeerClosed)
            };
        }
        total += n;
    }
    Ok(true)
}
