//! Interrupt driven touch acquisition.
//!
//! The acquisition is split into the two halves described by the pipeline
//! design: the data-ready ISR (top half) masks its interrupt line and records
//! the event in a depth-1 [`DataReady`] flag, nothing more; the main loop
//! (bottom half) consumes the flag, runs one read→decode→encode→publish cycle
//! through [`Digitizer::service`] and only then clears and unmasks the line.
//! The line therefore stays masked across the whole blocking bus transaction,
//! so a cycle can never be re-entered and the raw and encoded buffers have a
//! single writer at any time.
//!
//! A cycle also never starts while a previous IN transfer is in flight: the
//! main loop gates on [`ReportSink::busy`], and [`hid::publish`] drops the
//! report (counted, not retried) if the endpoint is caught busy anyway or the
//! link is down.

use crate::hid::{self, InputReport, Publish, ReportSink};
use crate::i2c::{self, I2C};
use crate::touch::{self, RawReport};
use core::sync::atomic::{AtomicBool, Ordering};

/// Depth-1 hand-off between the data-ready ISR (producer) and the main loop
/// (consumer). Further edges while an event is pending collapse into it.
pub struct DataReady(AtomicBool);

impl DataReady {
    pub const fn new() -> DataReady {
        DataReady(AtomicBool::new(false))
    }

    /// Record a data-ready edge. Interrupt context.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the pending event, if any.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No cycle in progress; the interrupt line may deliver a new event.
    Idle,
    /// The bus transaction pulling the raw frame is running.
    Reading,
    /// Decoding/encoding/publishing the frame that was just read.
    Encoding,
}

/// Owns the raw frame and the outgoing report for the device's lifetime and
/// runs the bottom half of the acquisition cycle.
pub struct Digitizer {
    raw: RawReport,
    report: InputReport,
    state: State,
    reports_sent: u32,
    reports_dropped: u32,
}

impl Digitizer {
    pub const fn new() -> Digitizer {
        Digitizer {
            raw: RawReport::new(),
            report: InputReport::new(),
            state: State::Idle,
            reports_sent: 0,
            reports_dropped: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn reports_sent(&self) -> u32 {
        self.reports_sent
    }

    pub fn reports_dropped(&self) -> u32 {
        self.reports_dropped
    }

    /// Run one acquisition cycle: pull the raw frame from the controller,
    /// then decode, encode and publish it.
    ///
    /// Returns to [`State::Idle`] on every exit path; a bus error aborts the
    /// cycle without touching the previously encoded report.
    pub fn service(
        &mut self,
        i2c_3: &mut I2C,
        sink: &mut impl ReportSink,
    ) -> Result<Publish, i2c::Error> {
        self.state = State::Reading;
        match touch::read_report(i2c_3, &mut self.raw) {
            Ok(()) => Ok(self.process(sink)),
            Err(err) => {
                self.state = State::Idle;
                Err(err)
            }
        }
    }

    fn process(&mut self, sink: &mut impl ReportSink) -> Publish {
        self.state = State::Encoding;
        let data = touch::decode(&self.raw);
        self.report.encode(&data);
        let outcome = hid::publish(&self.report, sink);
        match outcome {
            Publish::Sent => self.reports_sent += 1,
            Publish::Dropped(_) => self.reports_dropped += 1,
        }
        self.state = State::Idle;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::{DropReason, SendError, INPUT_REPORT_LEN};
    use crate::touch::RAW_REPORT_LEN;

    fn raw_frame(count: u8, contacts: &[(u8, u16, u16)]) -> RawReport {
        let mut bytes = [0u8; RAW_REPORT_LEN];
        bytes[2] = count;
        for (slot, &(id, x, y)) in contacts.iter().enumerate() {
            let base = 3 + slot * 6;
            bytes[base] = (x >> 8) as u8 & 0x0F;
            bytes[base + 1] = x as u8;
            bytes[base + 2] = id << 4 | (y >> 8) as u8 & 0x0F;
            bytes[base + 3] = y as u8;
        }
        RawReport::from_bytes(bytes)
    }

    struct FakeSink {
        busy: bool,
        inactive: bool,
        sent: std::vec::Vec<std::vec::Vec<u8>>,
    }

    impl FakeSink {
        fn new() -> FakeSink {
            FakeSink {
                busy: false,
                inactive: false,
                sent: std::vec::Vec::new(),
            }
        }
    }

    impl ReportSink for FakeSink {
        fn busy(&self) -> bool {
            self.busy
        }

        fn try_send(&mut self, report: &[u8]) -> Result<(), SendError> {
            if self.inactive {
                return Err(SendError::Inactive);
            }
            if self.busy {
                return Err(SendError::Busy);
            }
            self.sent.push(report.to_vec());
            self.busy = true;
            Ok(())
        }
    }

    #[test]
    fn data_ready_is_a_one_shot_flag() {
        let flag = DataReady::new();
        assert!(!flag.take());
        flag.set();
        flag.set(); // a second edge collapses into the pending one
        assert!(flag.is_pending());
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn cycle_encodes_frame_and_publishes() {
        let mut digitizer = Digitizer::new();
        digitizer.raw = raw_frame(2, &[(3, 100, 200), (7, 300, 400)]);
        let mut sink = FakeSink::new();

        assert_eq!(digitizer.process(&mut sink), Publish::Sent);
        assert_eq!(digitizer.state(), State::Idle);
        assert_eq!(digitizer.reports_sent(), 1);
        assert_eq!(digitizer.reports_dropped(), 0);

        let bytes = &sink.sent[0];
        assert_eq!(bytes.len(), INPUT_REPORT_LEN);
        assert_eq!(bytes[0], 1);
        // contact 0: tip set, id 3, X 100, Y 200
        assert_eq!(bytes[1], 1 | 3 << 2);
        assert_eq!(&bytes[2..6], &[100, 0, 200, 0]);
        // contact 1: tip set, id 7, X 300, Y 400
        assert_eq!(bytes[6], 1 | 7 << 2);
        assert_eq!(&bytes[7..11], &[44, 1, 144, 1]);
        assert_eq!(bytes[26], 2);
    }

    #[test]
    fn busy_endpoint_drops_second_cycle_without_corrupting_buffer() {
        let mut digitizer = Digitizer::new();
        digitizer.raw = raw_frame(1, &[(4, 10, 20)]);
        let mut sink = FakeSink::new();

        assert_eq!(digitizer.process(&mut sink), Publish::Sent);
        let first = sink.sent[0].clone();

        // endpoint still owns the buffer when the next frame arrives
        digitizer.raw = raw_frame(1, &[(5, 30, 40)]);
        assert_eq!(
            digitizer.process(&mut sink),
            Publish::Dropped(DropReason::PreviousInFlight)
        );
        assert_eq!(digitizer.state(), State::Idle);
        assert_eq!(digitizer.reports_sent(), 1);
        assert_eq!(digitizer.reports_dropped(), 1);
        // nothing new was handed over and the submitted bytes are untouched
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0], first);
    }

    #[test]
    fn link_down_drop_is_counted_and_machine_returns_to_idle() {
        let mut digitizer = Digitizer::new();
        digitizer.raw = raw_frame(1, &[(2, 50, 60)]);
        let mut sink = FakeSink::new();
        sink.inactive = true;

        assert_eq!(
            digitizer.process(&mut sink),
            Publish::Dropped(DropReason::LinkDown)
        );
        assert_eq!(digitizer.state(), State::Idle);
        assert_eq!(digitizer.reports_dropped(), 1);
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn empty_frame_publishes_all_clear_report() {
        let mut digitizer = Digitizer::new();
        digitizer.raw = raw_frame(0, &[]);
        let mut sink = FakeSink::new();

        assert_eq!(digitizer.process(&mut sink), Publish::Sent);
        let bytes = &sink.sent[0];
        assert!(bytes[1..26].iter().all(|&b| b == 0));
        assert_eq!(bytes[26], 0);
    }
}
