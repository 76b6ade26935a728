//! This crate provides an interface for communicating with and controlling DPS series programmable power supplies (e.g. the DPS-150) over their USB serial link.
//!
//! The device speaks a small binary framed protocol. Every frame looks like:
//!
//! | header | command | type | length | payload    | checksum |
//! |--------|---------|------|--------|------------|----------|
//! | 1 byte | 1 byte  | 1    | 1      | 0-255 bytes| 1        |
//!
//! Host to device frames start with `0xF1`, device to host frames with `0xF0`. The checksum
//! is the sum of the type, length and payload bytes, modulo 256. Analogue values are
//! little-endian `f32`.
//!
//! [`psu::DpsPsu`] runs a session: it opens a [`transport::Transport`], performs the
//! initialisation handshake, polls the full device state in the background and keeps a
//! [`state::DeviceState`] snapshot up to date. Listeners may subscribe to every change.
//!
//! The serial port used for PSU comms should be configured like so:
//! * Default baud rate: 115200
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! Enable the `serial` feature for a ready made transport built on the `serialport` crate.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod observer;
pub mod preset;
pub mod psu;
pub mod reassembly;
pub mod register;
pub mod scheduler;
#[cfg(feature = "serial")]
pub mod serial;
pub mod state;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod mock_serial;
