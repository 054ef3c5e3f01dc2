//! # ILS Aggregator
//!
//! Core library for a multi-channel IQ-sample aggregation server. Several independent
//! receivers stream complex baseband samples over TCP, one connection per channel; this
//! crate detects carrier onset per channel, time/amplitude/phase-aligns every auxiliary
//! channel to a designated reference channel, and coherently combines the aligned streams
//! into beamformed output packets for a single controller client.
//!
//! ## Crate structure
//!
//! - **`config`**: typed, validated settings loaded from TOML (`figment`), with CLI
//!   overrides. See [`config::Settings`].
//! - **`error`**: centralized `ServerError` enum used across every layer.
//! - **`dsp`**: allocation-free vector math shared by the synchronizer and combiner
//!   (moduli, arguments, median, phase compensation).
//! - **`channel`**: per-channel state machine (`ChannelState`) and the synchronizer that
//!   locks an auxiliary channel onto the reference.
//! - **`combiner`**: the lock-step cross-channel combiner.
//! - **`registry`**: the fixed-size `channel_id -> slot` exclusivity map.
//! - **`protocol`**: wire framing for both the channel ingress and the controller link.
//! - **`worker`**: the single dedicated thread that owns all channel state and runs the
//!   synchronizer/combiner to completion for each submitted batch.
//! - **`net`**: async per-connection protocol drivers (channel ingress, controller
//!   ingress/egress) built on Tokio.
//! - **`server`**: wires the above into a running service.
//! - **`validation`**: small reusable config validators.

pub mod channel;
pub mod combiner;
pub mod config;
pub mod dsp;
pub mod error;
pub mod net;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod validation;
pub mod worker;

pub use error::{ServerError, ServerResult};
