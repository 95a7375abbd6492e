//! [`AddressMonitor`] – per-address liveness, counter and checksum checks.
//!
//! Every safety-relevant receive address gets one [`AddrCheckEntry`]. Each
//! received frame is passed to [`AddressMonitor::check`] before anything
//! else looks at it. The monitor answers with an [`RxVerdict`] for that
//! single frame and keeps per-entry runtime state from which the aggregate
//! [`degraded`][AddressMonitor::degraded] signal is derived:
//!
//! - **Length** – a frame on a monitored address/bus must have the
//!   configured length.
//! - **Counter** – the rolling counter must advance by exactly one modulo
//!   `max + 1`. Wrong counters also feed a saturating hysteresis counter;
//!   the entry is degraded while it sits at [`MAX_WRONG_COUNTERS`].
//! - **Checksum** – recomputed and compared on every frame.
//! - **Liveness** – an entry whose last valid frame is older than
//!   `max(expected_interval * MAX_MISSED_MSGS, MIN_LIVENESS_WINDOW_US)` is
//!   lagging until a fresh valid frame arrives.
//!
//! Faults are state, never errors: the input is untrusted bus traffic.
//!
//! # Example
//!
//! ```
//! use canguard_hal::SignalSpec;
//! use canguard_kernel::address_monitor::{AddrCheckEntry, AddrCheckVariant, AddressMonitor, CounterSpec};
//! use canguard_types::{CanFrame, MessageDescriptor};
//!
//! let counter = CounterSpec { signal: SignalSpec::be("cnt", 0, 0, 4), max: 15 };
//! let mut monitor = AddressMonitor::new(vec![AddrCheckEntry::single(
//!     AddrCheckVariant::new(MessageDescriptor::new(0x100, 0, 8), 20_000).with_counter(counter),
//! )]);
//!
//! let frame = |c: u8, t: u64| CanFrame::new(0, 0x100, &[c, 0, 0, 0, 0, 0, 0, 0]).unwrap().at(t);
//! assert!(monitor.check(&frame(3, 0)));      // seeds the counter
//! assert!(monitor.check(&frame(4, 20_000)));
//! assert!(!monitor.check(&frame(9, 40_000))); // skipped ahead
//! ```

use canguard_hal::{ChecksumSpec, SignalSpec};
use canguard_types::{AddrHealth, CanFrame, Fault, MessageDescriptor, RxVerdict};
use tracing::{debug, info, warn};

/// Upper bound on bus/length variants per monitored address.
pub const MAX_ADDR_CHECK_VARIANTS: usize = 3;

/// Wrong-counter hysteresis level at which a source counts as degraded.
pub const MAX_WRONG_COUNTERS: u8 = 5;

/// Number of expected intervals that may pass before a source is lagging.
pub const MAX_MISSED_MSGS: u64 = 10;

/// Lower bound on the liveness window regardless of the expected interval.
pub const MIN_LIVENESS_WINDOW_US: u64 = 1_000_000;

// ────────────────────────────────────────────────────────────────────────────
// Static configuration
// ────────────────────────────────────────────────────────────────────────────

/// Location and wrap-around value of a rolling counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSpec {
    pub signal: SignalSpec,
    /// Largest counter value; the next value after `max` is `0`.
    pub max: u64,
}

/// One `(address, bus, length)` variant of a monitored message and the
/// checks enabled for it.
#[derive(Debug, Clone, PartialEq)]
pub struct AddrCheckVariant {
    pub msg: MessageDescriptor,
    pub checksum: Option<ChecksumSpec>,
    pub counter: Option<CounterSpec>,
    /// Nominal period between frames, in microseconds.
    pub expected_interval_us: u64,
    /// When non-zero, a repeated counter arriving within this many
    /// microseconds of the previous valid frame is accepted as a duplicate.
    pub duplicate_tolerance_us: u64,
}

impl AddrCheckVariant {
    /// A variant with only length and liveness checks.
    pub fn new(msg: MessageDescriptor, expected_interval_us: u64) -> Self {
        Self {
            msg,
            checksum: None,
            counter: None,
            expected_interval_us,
            duplicate_tolerance_us: 0,
        }
    }

    pub fn with_counter(mut self, counter: CounterSpec) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumSpec) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn with_duplicate_tolerance(mut self, tolerance_us: u64) -> Self {
        self.duplicate_tolerance_us = tolerance_us;
        self
    }

    fn liveness_window_us(&self) -> u64 {
        self.expected_interval_us
            .saturating_mul(MAX_MISSED_MSGS)
            .max(MIN_LIVENESS_WINDOW_US)
    }
}

/// A monitored receive message: up to [`MAX_ADDR_CHECK_VARIANTS`] variants,
/// the first one seen is latched for the rest of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct AddrCheckEntry {
    pub variants: Vec<AddrCheckVariant>,
}

impl AddrCheckEntry {
    pub fn single(variant: AddrCheckVariant) -> Self {
        Self {
            variants: vec![variant],
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Runtime state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct AddrRuntime {
    seen: bool,
    variant: usize,
    last_counter: u64,
    wrong_counters: u8,
    checksum_ok: bool,
    lagging: bool,
    last_timestamp_us: u64,
}

impl AddrRuntime {
    fn new() -> Self {
        Self {
            seen: false,
            variant: 0,
            last_counter: 0,
            wrong_counters: 0,
            checksum_ok: true,
            lagging: false,
            last_timestamp_us: 0,
        }
    }

    fn counter_degraded(&self) -> bool {
        self.wrong_counters >= MAX_WRONG_COUNTERS
    }

    fn healthy(&self) -> bool {
        self.seen && !self.lagging && !self.counter_degraded() && self.checksum_ok
    }
}

enum Lookup {
    Miss,
    WrongLength(usize),
    Hit(usize, usize),
}

// ────────────────────────────────────────────────────────────────────────────
// AddressMonitor
// ────────────────────────────────────────────────────────────────────────────

/// Validates received frames against the static [`AddrCheckEntry`] table and
/// tracks the health of each monitored source.
#[derive(Debug, Clone)]
pub struct AddressMonitor {
    entries: Vec<AddrCheckEntry>,
    runtime: Vec<AddrRuntime>,
}

impl AddressMonitor {
    /// Create a monitor with every entry in the "not yet seen" state.
    pub fn new(entries: Vec<AddrCheckEntry>) -> Self {
        let runtime = entries.iter().map(|_| AddrRuntime::new()).collect();
        Self { entries, runtime }
    }

    /// `true` unless the frame is a monitored message failing a check.
    pub fn check(&mut self, frame: &CanFrame) -> bool {
        self.verdict(frame).is_valid()
    }

    /// Run every enabled check for `frame` and update runtime state.
    ///
    /// Also refreshes the liveness of every other entry using the frame's
    /// timestamp as the current time.
    pub fn verdict(&mut self, frame: &CanFrame) -> RxVerdict {
        let verdict = match self.lookup(frame) {
            Lookup::Miss => RxVerdict::Unmonitored,
            Lookup::WrongLength(index) => {
                debug!(
                    addr = %format_args!("{:#x}", frame.address),
                    bus = frame.bus,
                    len = frame.len,
                    entry = index,
                    "length mismatch on monitored address"
                );
                RxVerdict::Invalid(Fault::Length)
            }
            Lookup::Hit(index, variant) => self.check_entry(index, variant, frame),
        };
        self.tick(frame.timestamp_us);
        verdict
    }

    fn lookup(&self, frame: &CanFrame) -> Lookup {
        let mut wrong_length = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let rt = &self.runtime[index];
            for (v, variant) in entry.variants.iter().enumerate() {
                if rt.seen && v != rt.variant {
                    continue;
                }
                if variant.msg.address != frame.address || variant.msg.bus != frame.bus {
                    continue;
                }
                if variant.msg.len == frame.len {
                    return Lookup::Hit(index, v);
                }
                wrong_length.get_or_insert(index);
            }
        }
        wrong_length.map_or(Lookup::Miss, Lookup::WrongLength)
    }

    fn check_entry(&mut self, index: usize, v: usize, frame: &CanFrame) -> RxVerdict {
        let variant = &self.entries[index].variants[v];
        let rt = &mut self.runtime[index];
        let first = !rt.seen;

        rt.checksum_ok = variant.checksum.is_none_or(|spec| spec.verify(frame));

        let mut counter_ok = true;
        if let Some(counter) = variant.counter {
            let value = counter.signal.raw(frame);
            if !first {
                let expected = (rt.last_counter + 1) % (counter.max + 1);
                let duplicate = variant.duplicate_tolerance_us > 0
                    && value == rt.last_counter
                    && frame.timestamp_us.saturating_sub(rt.last_timestamp_us)
                        <= variant.duplicate_tolerance_us;
                counter_ok = value == expected || duplicate;

                let was_degraded = rt.counter_degraded();
                rt.wrong_counters = if counter_ok {
                    rt.wrong_counters.saturating_sub(1)
                } else {
                    (rt.wrong_counters + 1).min(MAX_WRONG_COUNTERS)
                };
                if !was_degraded && rt.counter_degraded() {
                    warn!(
                        addr = %format_args!("{:#x}", frame.address),
                        "source degraded: too many wrong counters"
                    );
                } else if was_degraded && !rt.counter_degraded() {
                    info!(addr = %format_args!("{:#x}", frame.address), "counter recovered");
                }
            }
            rt.last_counter = value;
        }

        rt.seen = true;
        rt.variant = v;

        let verdict = if !rt.checksum_ok {
            RxVerdict::Invalid(Fault::Checksum)
        } else if !counter_ok {
            RxVerdict::Invalid(Fault::Counter)
        } else {
            RxVerdict::Valid
        };

        if verdict == RxVerdict::Valid {
            if rt.lagging {
                info!(addr = %format_args!("{:#x}", frame.address), "source alive again");
            }
            rt.last_timestamp_us = frame.timestamp_us;
            rt.lagging = false;
        } else {
            debug!(
                addr = %format_args!("{:#x}", frame.address),
                ?verdict,
                "monitored frame rejected"
            );
        }
        verdict
    }

    /// Re-evaluate liveness of every seen entry at time `now_us`.
    pub fn tick(&mut self, now_us: u64) {
        for (entry, rt) in self.entries.iter().zip(self.runtime.iter_mut()) {
            if !rt.seen {
                continue;
            }
            let variant = &entry.variants[rt.variant];
            let lagging =
                now_us.saturating_sub(rt.last_timestamp_us) > variant.liveness_window_us();
            if lagging && !rt.lagging {
                warn!(
                    addr = %format_args!("{:#x}", variant.msg.address),
                    bus = variant.msg.bus,
                    "source lagging: liveness timeout"
                );
            }
            rt.lagging = lagging;
        }
    }

    /// Per-entry health for read-only consumers, in table order.
    pub fn health(&self) -> Vec<AddrHealth> {
        self.entries
            .iter()
            .zip(&self.runtime)
            .map(|(entry, rt)| {
                let msg = entry.variants[rt.variant].msg;
                AddrHealth {
                    address: msg.address,
                    bus: msg.bus,
                    seen: rt.seen,
                    lagging: rt.lagging,
                    counter_degraded: rt.counter_degraded(),
                    checksum_ok: rt.checksum_ok,
                }
            })
            .collect()
    }

    /// `true` while any monitored source is missing, lagging, or failing its
    /// counter or checksum checks.
    pub fn degraded(&self) -> bool {
        self.runtime.iter().any(|rt| !rt.healthy())
    }

    /// Return every entry to "not yet seen".
    pub fn reset(&mut self) {
        for rt in &mut self.runtime {
            *rt = AddrRuntime::new();
        }
    }
}
