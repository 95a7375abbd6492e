//! candump log replay through a [`SafetyEngine`].
//!
//! Accepted line format (`candump -l` plus an optional direction marker):
//!
//! ```text
//! (1700000000.123456) can0 415#0E10040000000000
//! (1700000000.133456) TX can0 3D3#7D00100FA0800000
//! ```
//!
//! Received lines go through the receive path and are forwarded on the
//! simulated buses. `TX` lines are frames the driving policy wants to send;
//! they go through the gatekeeper and are transmitted only when allowed.
//! Blank lines and lines starting with `#` are skipped.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};

use canguard_hal::{CanTransceiver, SimBus};
use canguard_kernel::SafetyEngine;
use canguard_types::{BusId, CanFrame, RxVerdict, SafetyError, MAX_FRAME_LEN};
use tracing::warn;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp_us: u64,
    pub direction: Direction,
    pub interface: String,
    pub address: u32,
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn to_frame(&self, bus: BusId) -> Result<CanFrame, SafetyError> {
        Ok(CanFrame::new(bus, self.address, &self.payload)?.at(self.timestamp_us))
    }
}

/// Parse one log line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<LogRecord>, SafetyError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace();
    let timestamp_us = parse_timestamp(tokens.next().unwrap_or_default())?;

    let mut next = tokens
        .next()
        .ok_or_else(|| bad_line(line, "missing interface"))?;
    let direction = if next.eq_ignore_ascii_case("tx") {
        next = tokens
            .next()
            .ok_or_else(|| bad_line(line, "missing interface"))?;
        Direction::Tx
    } else {
        Direction::Rx
    };
    let interface = next.to_string();

    let body = tokens
        .next()
        .ok_or_else(|| bad_line(line, "missing frame"))?;
    let (id, data) = body
        .split_once('#')
        .ok_or_else(|| bad_line(line, "frame has no '#'"))?;
    if id.is_empty() || id.len() > 8 {
        return Err(bad_line(line, "bad identifier"));
    }
    let address = u32::from_str_radix(id, 16).map_err(|_| bad_line(line, "bad identifier"))?;
    let payload = parse_hex(data).ok_or_else(|| bad_line(line, "bad payload"))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(bad_line(line, "payload longer than 8 bytes"));
    }

    Ok(Some(LogRecord {
        timestamp_us,
        direction,
        interface,
        address,
        payload,
    }))
}

fn bad_line(line: &str, what: &str) -> SafetyError {
    SafetyError::Config(format!("{what}: '{line}'"))
}

/// `(secs.frac)` → microseconds. Fractions are padded or cut to 6 digits.
fn parse_timestamp(token: &str) -> Result<u64, SafetyError> {
    let inner = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| bad_line(token, "timestamp must be '(secs.micros)'"))?;
    let (secs, frac) = inner.split_once('.').unwrap_or((inner, "0"));
    let secs: u64 = secs.parse().map_err(|_| bad_line(token, "bad timestamp"))?;
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad_line(token, "bad timestamp"));
    }
    let mut micros = 0u64;
    for i in 0..6 {
        let digit = frac.as_bytes().get(i).map_or(0, |b| u64::from(b - b'0'));
        micros = micros * 10 + digit;
    }
    secs.checked_mul(1_000_000)
        .and_then(|us| us.checked_add(micros))
        .ok_or_else(|| bad_line(token, "timestamp out of range"))
}

fn parse_hex(data: &str) -> Option<Vec<u8>> {
    if data.len() % 2 != 0 {
        return None;
    }
    (0..data.len())
        .step_by(2)
        .map(|i| data.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Replay
// ────────────────────────────────────────────────────────────────────────────

/// What happened to one replayed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayEvent {
    Rx {
        frame: CanFrame,
        verdict: RxVerdict,
        forward: Option<BusId>,
    },
    Tx {
        frame: CanFrame,
        result: Result<(), SafetyError>,
    },
    Skipped {
        line: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub rx_frames: usize,
    pub rx_invalid: usize,
    pub rx_unmonitored: usize,
    pub dropped: usize,
    pub tx_allowed: usize,
    pub tx_denied: usize,
    pub skipped: usize,
    /// Frames put on each simulated bus (forwarded or allowed tx).
    pub sent_per_bus: BTreeMap<BusId, u64>,
    pub interrupted: bool,
}

/// Feeds log records through the engine and a set of simulated buses.
pub struct Replayer<'a> {
    engine: &'a mut SafetyEngine,
    config: &'a Config,
    buses: BTreeMap<BusId, SimBus>,
    sent: BTreeMap<BusId, u64>,
}

impl<'a> Replayer<'a> {
    pub fn new(engine: &'a mut SafetyEngine, config: &'a Config) -> Self {
        let buses = config
            .bus_map
            .values()
            .map(|&bus| (bus, SimBus::new(bus)))
            .collect();
        Self {
            engine,
            config,
            buses,
            sent: BTreeMap::new(),
        }
    }

    /// Replay every line of `reader`, calling `on_event` per frame. Stops
    /// early when `stop` is set.
    pub fn run<R: BufRead>(
        &mut self,
        reader: R,
        stop: &AtomicBool,
        mut on_event: impl FnMut(&ReplayEvent),
    ) -> Result<ReplaySummary, SafetyError> {
        let mut summary = ReplaySummary::default();
        for (index, line) in reader.lines().enumerate() {
            if stop.load(Ordering::SeqCst) {
                summary.interrupted = true;
                break;
            }
            let line = line.map_err(|e| SafetyError::Config(format!("failed to read log: {e}")))?;
            let event = match self.replay_line(index + 1, &line) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => ReplayEvent::Skipped {
                    line: index + 1,
                    reason: e.to_string(),
                },
            };
            summary.record(&event);
            on_event(&event);
        }
        summary.sent_per_bus = self.sent.clone();
        Ok(summary)
    }

    fn replay_line(&mut self, number: usize, line: &str) -> Result<Option<ReplayEvent>, SafetyError> {
        let Some(record) = parse_line(line)? else {
            return Ok(None);
        };
        let Some(bus) = self.config.bus_for(&record.interface) else {
            return Ok(Some(ReplayEvent::Skipped {
                line: number,
                reason: format!("interface '{}' is not in bus_map", record.interface),
            }));
        };
        let frame = record.to_frame(bus)?;
        let event = match record.direction {
            Direction::Rx => self.receive(frame)?,
            Direction::Tx => self.transmit(frame)?,
        };
        Ok(Some(event))
    }

    fn receive(&mut self, frame: CanFrame) -> Result<ReplayEvent, SafetyError> {
        let source = self.sim(frame.bus)?;
        source.inject(frame);
        let Some(frame) = source.recv() else {
            return Err(SafetyError::Transport {
                bus: frame.bus.to_string(),
                details: "injected frame was not received".to_string(),
            });
        };

        let outcome = self.engine.process_rx(&frame);
        if let Some(target) = outcome.forward {
            if self.buses.contains_key(&target) {
                self.put(target, frame)?;
            } else {
                warn!(bus = target, "forward target has no interface in bus_map");
            }
        }
        Ok(ReplayEvent::Rx {
            frame,
            verdict: outcome.verdict,
            forward: outcome.forward,
        })
    }

    fn transmit(&mut self, frame: CanFrame) -> Result<ReplayEvent, SafetyError> {
        self.engine.tick(frame.timestamp_us);
        let result = self.engine.try_authorize(&frame);
        if result.is_ok() {
            self.put(frame.bus, frame)?;
        }
        Ok(ReplayEvent::Tx { frame, result })
    }

    /// Send on a simulated bus and count it. The bus's transmit record is
    /// drained so a long log does not accumulate frames.
    fn put(&mut self, bus: BusId, frame: CanFrame) -> Result<(), SafetyError> {
        let sim = self.sim(bus)?;
        sim.send(frame)?;
        let sent = sim.drain_transmitted().count() as u64;
        *self.sent.entry(bus).or_default() += sent;
        Ok(())
    }

    fn sim(&mut self, bus: BusId) -> Result<&mut SimBus, SafetyError> {
        self.buses.get_mut(&bus).ok_or_else(|| SafetyError::Transport {
            bus: bus.to_string(),
            details: "no simulated controller".to_string(),
        })
    }
}

impl ReplaySummary {
    fn record(&mut self, event: &ReplayEvent) {
        match event {
            ReplayEvent::Rx {
                verdict, forward, ..
            } => {
                self.rx_frames += 1;
                match verdict {
                    RxVerdict::Invalid(_) => self.rx_invalid += 1,
                    RxVerdict::Unmonitored => self.rx_unmonitored += 1,
                    RxVerdict::Valid => {}
                }
                if forward.is_none() {
                    self.dropped += 1;
                }
            }
            ReplayEvent::Tx { result, .. } => {
                if result.is_ok() {
                    self.tx_allowed += 1;
                } else {
                    self.tx_denied += 1;
                }
            }
            ReplayEvent::Skipped { .. } => self.skipped += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canguard_kernel::{EngineOptions, VehicleModel};

    fn engine() -> SafetyEngine {
        SafetyEngine::new(VehicleModel::Ford.profile().unwrap(), EngineOptions::default()).unwrap()
    }

    #[test]
    fn parses_rx_line() {
        let rec = parse_line("(1700000000.123456) can0 415#0E10040000000000")
            .unwrap()
            .unwrap();
        assert_eq!(rec.timestamp_us, 1_700_000_000_123_456);
        assert_eq!(rec.direction, Direction::Rx);
        assert_eq!(rec.interface, "can0");
        assert_eq!(rec.address, 0x415);
        assert_eq!(rec.payload, vec![0x0E, 0x10, 0x04, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn parses_tx_marker_and_short_fraction() {
        let rec = parse_line("(12.5) TX can2 083#").unwrap().unwrap();
        assert_eq!(rec.timestamp_us, 12_500_000);
        assert_eq!(rec.direction, Direction::Tx);
        assert_eq!(rec.interface, "can2");
        assert!(rec.payload.is_empty());
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# captured on the highway").unwrap(), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in [
            "can0 415#00",
            "(1.0) can0",
            "(1.0) can0 415",
            "(1.0) can0 XYZ#00",
            "(1.0) can0 415#0",
            "(1.0) can0 415#000102030405060708",
            "(1.x) can0 415#00",
        ] {
            assert!(matches!(parse_line(line), Err(SafetyError::Config(_))), "{line}");
        }
    }

    #[test]
    fn replay_forwards_and_gates() {
        let log = "\
(0.010000) can0 7E8#0000000000000000
(0.020000) can2 3CA#0000000000000000
(0.030000) can2 165#0000000000000000
(0.040000) TX can0 3CA#2000000000000000
(0.050000) TX can0 3D8#0000000000000000
(0.060000) can9 165#0000000000000000
";
        let mut engine = engine();
        let config = Config::default();
        let stop = AtomicBool::new(false);
        let mut events = Vec::new();
        let summary = Replayer::new(&mut engine, &config)
            .run(log.as_bytes(), &stop, |e| events.push(e.clone()))
            .unwrap();

        assert_eq!(summary.rx_frames, 3);
        assert_eq!(summary.dropped, 1); // stock LKAS from the camera
        assert_eq!(summary.tx_allowed, 1);
        assert_eq!(summary.tx_denied, 1);
        assert_eq!(summary.skipped, 1);
        // 7E8 to the camera; 165 back to the vehicle plus the allowed tx.
        assert_eq!(summary.sent_per_bus.get(&2), Some(&1));
        assert_eq!(summary.sent_per_bus.get(&0), Some(&2));
        assert!(!summary.interrupted);
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn replay_counts_sends_without_keeping_frames() {
        let log: String = (0..500)
            .map(|i| format!("({}.000000) can0 7E8#0000000000000000\n", i))
            .collect();
        let mut engine = engine();
        let config = Config::default();
        let stop = AtomicBool::new(false);
        let mut replayer = Replayer::new(&mut engine, &config);
        let summary = replayer.run(log.as_bytes(), &stop, |_| {}).unwrap();

        assert_eq!(summary.sent_per_bus.get(&2), Some(&500));
        assert!(replayer.buses.values().all(|sim| sim.transmitted().is_empty()));
    }

    #[test]
    fn replay_stops_when_interrupted() {
        let mut engine = engine();
        let config = Config::default();
        let stop = AtomicBool::new(true);
        let summary = Replayer::new(&mut engine, &config)
            .run("(0.0) can0 7E8#00\n".as_bytes(), &stop, |_| {})
            .unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.rx_frames, 0);
    }
}
