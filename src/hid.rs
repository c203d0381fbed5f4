//! HID digitizer input report encoding and the publish policy.
//!
//! Binding wire format of the input report (report ID 1, 27 bytes):
//!
//! ```text
//! byte 0        report ID = 1
//! bytes 1+5*i   contact block i (i = 0..4):
//!   +0          status: bit 0 = tip switch, bits 2..7 = contact identifier
//!   +1..2       X, little-endian
//!   +3..4       Y, little-endian
//! byte 26       number of valid contacts
//! ```
//!
//! The feature report (report ID 2) is a single byte carrying the maximum
//! simultaneously supported contact count.
//!
//! The publisher never queues: at most one digitizer report is outstanding at
//! a time, and a report that cannot be handed to the endpoint (previous
//! transfer still in flight, device not configured) is dropped.

use crate::touch::{TouchData, MAX_CONTACTS};
use byteorder::{ByteOrder, LittleEndian};

pub const INPUT_REPORT_ID: u8 = 1;
pub const FEATURE_REPORT_ID: u8 = 2;

pub const CONTACT_BLOCK_LEN: usize = 5;
/// Report id + five contact blocks + trailing contact count.
pub const INPUT_REPORT_LEN: usize = 1 + MAX_CONTACTS * CONTACT_BLOCK_LEN + 1;

// Status byte layout inside a contact block; matches the report descriptor:
// tip switch (1 bit), constant pad (1 bit), contact identifier (6 bits).
const TIP_SWITCH_BIT: u8 = 1 << 0;
const CONTACT_ID_SHIFT: usize = 2;
const CONTACT_ID_MASK: u8 = 0x3F;

const FIRST_CONTACT_OFFSET: usize = 1;
const COUNT_OFFSET: usize = INPUT_REPORT_LEN - 1;

/// The outgoing input report buffer. Overwritten wholesale by every
/// [`encode`](InputReport::encode); reused for the device's lifetime.
pub struct InputReport {
    bytes: [u8; INPUT_REPORT_LEN],
}

impl InputReport {
    pub const fn new() -> InputReport {
        InputReport {
            bytes: [0; INPUT_REPORT_LEN],
        }
    }

    /// Map decoded contacts into the fixed wire layout above.
    pub fn encode(&mut self, data: &TouchData) {
        self.bytes[0] = INPUT_REPORT_ID;
        for (slot, contact) in data.contacts.iter().enumerate() {
            let base = FIRST_CONTACT_OFFSET + slot * CONTACT_BLOCK_LEN;
            let mut status = (contact.id & CONTACT_ID_MASK) << CONTACT_ID_SHIFT;
            if contact.tip {
                status |= TIP_SWITCH_BIT;
            }
            self.bytes[base] = status;
            LittleEndian::write_u16(&mut self.bytes[base + 1..base + 3], contact.x);
            LittleEndian::write_u16(&mut self.bytes[base + 3..base + 5], contact.y);
        }
        self.bytes[COUNT_OFFSET] = data.count;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Feature report payload: report id + maximum contact count.
pub fn feature_report() -> [u8; 2] {
    [FEATURE_REPORT_ID, MAX_CONTACTS as u8]
}

/// The transmit side of the USB stack as seen by the pipeline.
pub trait ReportSink {
    /// Whether a previously submitted report has not finished transmitting.
    fn busy(&self) -> bool;
    /// Hand one encoded report to the IN endpoint.
    fn try_send(&mut self, report: &[u8]) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The endpoint still owns the previous buffer.
    Busy,
    /// The link is not ready (device unconfigured or endpoint stalled).
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Sent,
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    PreviousInFlight,
    LinkDown,
}

/// Submit `report` to `sink` under the at-most-one-outstanding policy.
pub fn publish(report: &InputReport, sink: &mut impl ReportSink) -> Publish {
    if sink.busy() {
        return Publish::Dropped(DropReason::PreviousInFlight);
    }
    match sink.try_send(report.as_bytes()) {
        Ok(()) => Publish::Sent,
        Err(SendError::Busy) => Publish::Dropped(DropReason::PreviousInFlight),
        Err(SendError::Inactive) => Publish::Dropped(DropReason::LinkDown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::touch::Contact;

    fn touch_data(contacts: &[(u8, u16, u16)]) -> TouchData {
        let mut data = TouchData {
            contacts: [Contact::default(); MAX_CONTACTS],
            count: contacts.len() as u8,
        };
        for (slot, &(id, x, y)) in contacts.iter().enumerate() {
            data.contacts[slot] = Contact {
                id,
                x,
                y,
                tip: true,
            };
        }
        data
    }

    fn parse_block(bytes: &[u8], slot: usize) -> (bool, u8, u16, u16) {
        let base = FIRST_CONTACT_OFFSET + slot * CONTACT_BLOCK_LEN;
        let status = bytes[base];
        (
            status & TIP_SWITCH_BIT != 0,
            status >> CONTACT_ID_SHIFT & CONTACT_ID_MASK,
            LittleEndian::read_u16(&bytes[base + 1..base + 3]),
            LittleEndian::read_u16(&bytes[base + 3..base + 5]),
        )
    }

    #[test]
    fn encode_matches_wire_layout() {
        let mut report = InputReport::new();
        report.encode(&touch_data(&[(3, 100, 200), (7, 300, 400)]));
        let bytes = report.as_bytes();

        assert_eq!(bytes.len(), 27);
        assert_eq!(bytes[0], INPUT_REPORT_ID);
        assert_eq!(parse_block(bytes, 0), (true, 3, 100, 200));
        assert_eq!(parse_block(bytes, 1), (true, 7, 300, 400));
        for slot in 2..MAX_CONTACTS {
            assert_eq!(parse_block(bytes, slot), (false, 0, 0, 0));
        }
        assert_eq!(bytes[COUNT_OFFSET], 2);
    }

    #[test]
    fn encode_round_trips_every_slot() {
        let input = [(0, 1, 2), (15, 4095, 4095), (7, 300, 400), (9, 42, 7), (1, 480, 272)];
        let data = touch_data(&input);
        let mut report = InputReport::new();
        report.encode(&data);

        for (slot, &(id, x, y)) in input.iter().enumerate() {
            assert_eq!(parse_block(report.as_bytes(), slot), (true, id, x, y));
        }
        assert_eq!(report.as_bytes()[COUNT_OFFSET], 5);
    }

    #[test]
    fn encode_is_idempotent() {
        let data = touch_data(&[(2, 123, 456)]);
        let mut first = InputReport::new();
        first.encode(&data);
        let mut second = InputReport::new();
        second.encode(&data);
        second.encode(&data);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn encode_empty_report() {
        let mut report = InputReport::new();
        // make sure a previous frame cannot shine through
        report.encode(&touch_data(&[(3, 100, 200), (7, 300, 400)]));
        report.encode(&touch_data(&[]));
        let bytes = report.as_bytes();

        for slot in 0..MAX_CONTACTS {
            assert_eq!(parse_block(bytes, slot), (false, 0, 0, 0));
        }
        assert_eq!(bytes[COUNT_OFFSET], 0);
    }

    #[test]
    fn feature_report_carries_contact_maximum() {
        assert_eq!(feature_report(), [2, 5]);
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
    fn publish_hands_report_to_idle_sink() {
        let mut report = InputReport::new();
        report.encode(&touch_data(&[(1, 11, 22)]));
        let mut sink = FakeSink::new();

        assert_eq!(publish(&report, &mut sink), Publish::Sent);
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0], report.as_bytes());
    }

    #[test]
    fn publish_drops_while_previous_report_in_flight() {
        let mut report = InputReport::new();
        report.encode(&touch_data(&[(1, 11, 22)]));
        let mut sink = FakeSink::new();

        assert_eq!(publish(&report, &mut sink), Publish::Sent);
        // endpoint has not completed; the second report must not queue
        assert_eq!(
            publish(&report, &mut sink),
            Publish::Dropped(DropReason::PreviousInFlight)
        );
        assert_eq!(sink.sent.len(), 1);
    }

    #[test]
    fn publish_drops_when_link_down() {
        let report = InputReport::new();
        let mut sink = FakeSink::new();
        sink.inactive = true;

        assert_eq!(
            publish(&report, &mut sink),
            Publish::Dropped(DropReason::LinkDown)
        );
        assert!(sink.sent.is_empty());
    }
}
