//! `canguard-hal` – signal-level primitives and the bus driver seam.
//!
//! # Modules
//!
//! - [`signal`] – [`SignalSpec`][signal::SignalSpec]: bit offset / width /
//!   scale description of one signal and the decoder that extracts it.
//! - [`checksum`] – [`ChecksumSpec`][checksum::ChecksumSpec]: recompute and
//!   verify per-frame checksums.
//! - [`lookup`] – [`LookupTable`][lookup::LookupTable]: piecewise-linear
//!   interpolation used for speed-dependent limits.
//! - [`sample`] – [`SampleBuffer`][sample::SampleBuffer]: rolling window of
//!   recent measurements with min / max / mean.
//! - [`transceiver`] – [`CanTransceiver`][transceiver::CanTransceiver]: the
//!   trait a CAN controller driver implements.
//! - [`sim`] – [`SimBus`][sim::SimBus]: in-memory transceiver for tests and
//!   log replay.

pub mod checksum;
pub mod lookup;
pub mod sample;
pub mod signal;
pub mod sim;
pub mod transceiver;

pub use checksum::{ChecksumAlgorithm, ChecksumSpec};
pub use lookup::{interpolate, LookupTable};
pub use sample::{SampleBuffer, SAMPLE_BUFFER_LEN};
pub use signal::SignalSpec;
pub use sim::SimBus;
pub use transceiver::CanTransceiver;
