//! Wire framing for the channel ingress links and the controller link.
//!
//! Every format here is little-endian and fixed-layout, so encoding and decoding are
//! plain byte-slice manipulation rather than a general serializer; see [`crate::net`]
//! for the async readers/writers that sit on top of these functions.

use crate::error::{ServerError, ServerResult};
use num_complex::Complex64;

/// Byte length of a channel frame header (`uint64_le length` + `uint8 saturation_flag`).
pub const CHANNEL_FRAME_HEADER_LEN: usize = 9;

/// A decoded channel frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFrameHeader {
    pub payload_len: u64,
    pub saturation: bool,
}

/// Decodes a 9-byte channel frame header.
pub fn decode_channel_frame_header(bytes: &[u8; CHANNEL_FRAME_HEADER_LEN]) -> ChannelFrameHeader {
    let payload_len = u64::from_le_bytes(bytes[0..8].try_into().expect("8-byte slice"));
    ChannelFrameHeader {
        payload_len,
        saturation: bytes[8] != 0,
    }
}

/// Encodes a channel frame header. Exposed mainly for tests exercising the round trip.
pub fn encode_channel_frame_header(payload_len: u64, saturation: bool) -> [u8; CHANNEL_FRAME_HEADER_LEN] {
    let mut out = [0u8; CHANNEL_FRAME_HEADER_LEN];
    out[0..8].copy_from_slice(&payload_len.to_le_bytes());
    out[8] = saturation as u8;
    out
}

/// Decodes a tightly packed sequence of little-endian `int16` I/Q pairs into complex
/// samples. `payload.len()` must be a positive multiple of 4; anything else is a
/// [`ServerError::BadFrame`].
pub fn decode_iq_payload(payload: &[u8]) -> ServerResult<Vec<Complex64>> {
    if payload.is_empty() || payload.len() % 4 != 0 {
        return Err(ServerError::BadFrame(format!(
            "payload length {} is not a positive multiple of 4",
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(4)
        .map(|chunk| {
            let i = i16::from_le_bytes([chunk[0], chunk[1]]) as f64;
            let q = i16::from_le_bytes([chunk[2], chunk[3]]) as f64;
            Complex64::new(i, q)
        })
        .collect())
}

/// Encodes `int16` I/Q pairs as a channel frame payload. The inverse of
/// [`decode_iq_payload`] restricted to integral inputs, used by the round-trip tests.
pub fn encode_iq_i16_payload(pairs: &[(i16, i16)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pairs.len() * 4);
    for (i, q) in pairs {
        out.extend_from_slice(&i.to_le_bytes());
        out.extend_from_slice(&q.to_le_bytes());
    }
    out
}

/// Decodes the payload of a controller phase-shift message: `beam_count *
/// channel_amount` little-endian `float64` values.
pub fn decode_phase_shift_payload(
    channel_amount: u8,
    beam_count: u32,
    payload: &[u8],
) -> ServerResult<Vec<f64>> {
    let expected_len = 8 * channel_amount as usize * beam_count as usize;
    if payload.len() != expected_len {
        return Err(ServerError::ControllerProtocol(format!(
            "expected {expected_len} bytes of phase shifts for {beam_count} beam(s) over {channel_amount} channels, got {}",
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().expect("8-byte slice")))
        .collect())
}

/// Encodes `beam_count * channel_amount` phase shifts as a controller phase-shift
/// message body (the `uint32_le M` prefix is written separately by the caller).
pub fn encode_phase_shift_payload(shifts: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(shifts.len() * 8);
    for shift in shifts {
        out.extend_from_slice(&shift.to_le_bytes());
    }
    out
}

/// Encodes a combined output packet: `uint32_le payload_complex_count`, `uint8
/// shift_changed`, then `2 * payload_complex_count` interleaved `float64_le` I/Q values.
pub fn encode_output_packet(samples: &[Complex64], shift_changed: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + samples.len() * 16);
    out.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    out.push(shift_changed as u8);
    for sample in samples {
        out.extend_from_slice(&sample.re.to_le_bytes());
        out.extend_from_slice(&sample.im.to_le_bytes());
    }
    out
}
