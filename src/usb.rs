//! USB device surface: the OTG_FS bus glue and the HID digitizer class.
//!
//! The class carries the fixed descriptor tables (HID interface, one
//! interrupt IN endpoint polled every 4 ms, and the multi-touch report
//! descriptor) and answers the class control requests: Get_Report serves the
//! last pushed input report or the contact-count-maximum feature report,
//! Set_Idle/Set_Protocol are accepted, Set_Report is rejected (the device has
//! no output or feature reports to receive).
//!
//! The touch pipeline talks to all of this only through the
//! [`ReportSink`](crate::hid::ReportSink) impl at the bottom of this file.

use crate::hid::{self, ReportSink, SendError, FEATURE_REPORT_ID, INPUT_REPORT_ID, INPUT_REPORT_LEN};
use stm32f7::stm32f7x6::RCC;
use synopsys_usb_otg::UsbPeripheral;
use usb_device::class_prelude::*;
use usb_device::control::{Recipient, Request, RequestType};
use usb_device::device::UsbVidPid;
use usb_device::Result as UsbResult;

/// Shared test VID/PID pair.
pub const VID_PID: UsbVidPid = UsbVidPid(0x16C0, 0x05DF);

pub const MANUFACTURER: &str = "discovery";
pub const PRODUCT: &str = "HID Multi-Touch";

/// Endpoint FIFO memory of the OTG_FS core, in words.
pub const EP_MEMORY_WORDS: usize = 320;

const MAX_PACKET_SIZE: u16 = 64;
const POLL_INTERVAL_MS: u8 = 4;

const INTERFACE_CLASS_HID: u8 = 0x03;

const DESCRIPTOR_TYPE_HID: u8 = 0x21;
const DESCRIPTOR_TYPE_REPORT: u8 = 0x22;

const HID_REQ_GET_REPORT: u8 = 0x01;
const HID_REQ_GET_IDLE: u8 = 0x02;
const HID_REQ_GET_PROTOCOL: u8 = 0x03;
const HID_REQ_SET_REPORT: u8 = 0x09;
const HID_REQ_SET_IDLE: u8 = 0x0A;
const HID_REQ_SET_PROTOCOL: u8 = 0x0B;

// report type in the high byte of wValue of Get_Report/Set_Report
const REPORT_TYPE_INPUT: u8 = 1;
const REPORT_TYPE_FEATURE: u8 = 3;

/// The OTG_FS peripheral in full-speed device mode, handed to
/// `synopsys-usb-otg`. PA11/PA12 must already be configured as AF10.
pub struct UsbFs {
    hclk_hz: u32,
}

impl UsbFs {
    pub fn new(hclk_hz: u32) -> UsbFs {
        UsbFs { hclk_hz }
    }
}

unsafe impl UsbPeripheral for UsbFs {
    // OTG_FS register block, AHB2
    const REGISTERS: *const () = 0x5000_0000 as *const ();
    const HIGH_SPEED: bool = false;
    const FIFO_DEPTH_WORDS: usize = EP_MEMORY_WORDS;
    const ENDPOINT_COUNT: usize = 6;

    fn enable() {
        cortex_m::interrupt::free(|_| {
            let rcc = unsafe { &*RCC::ptr() };
            // enable and reset the OTG_FS core; its 48 MHz kernel clock
            // comes from PLLQ (see init::init_system_clock_216mhz)
            rcc.ahb2enr.modify(|_, w| w.otgfsen().set_bit());
            rcc.ahb2rstr.modify(|_, w| w.otgfsrst().set_bit());
            rcc.ahb2rstr.modify(|_, w| w.otgfsrst().clear_bit());
        });
    }

    fn ahb_frequency_hz(&self) -> u32 {
        self.hclk_hz
    }
}

pub type UsbBusType = synopsys_usb_otg::UsbBus<UsbFs>;

/// HID report descriptor: a Touch Screen application collection with five
/// logical Finger collections (tip switch, 6-bit contact identifier, 16-bit
/// X/Y), the trailing contact count, and the report-ID-2 Contact Count
/// Maximum feature report. Logical maxima match the 480x272 panel, physical
/// maxima its 95x54 mm active area in units of 10^-2 inch.
#[rustfmt::skip]
pub static REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x0D,       // USAGE_PAGE (Digitizers)
    0x09, 0x04,       // USAGE (Touch Screen)
    0xA1, 0x01,       // COLLECTION (Application)
    0x85, 0x01,       //   REPORT_ID (1)

    // contact 1
    0x09, 0x22,       //   USAGE (Finger)
    0xA1, 0x02,       //   COLLECTION (Logical)
    0x09, 0x42,       //     USAGE (Tip Switch)
    0x15, 0x00,       //     LOGICAL_MINIMUM (0)
    0x25, 0x01,       //     LOGICAL_MAXIMUM (1)
    0x75, 0x01,       //     REPORT_SIZE (1)
    0x95, 0x01,       //     REPORT_COUNT (1)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x81, 0x03,       //     INPUT (Cnst,Var,Abs)
    0x75, 0x06,       //     REPORT_SIZE (6)
    0x25, 0x3F,       //     LOGICAL_MAXIMUM (63)
    0x09, 0x51,       //     USAGE (Contact Identifier)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xA4,             //     PUSH
    0x05, 0x01,       //     USAGE_PAGE (Generic Desktop)
    0x75, 0x10,       //     REPORT_SIZE (16)
    0x26, 0xE0, 0x01, //     LOGICAL_MAXIMUM (480)
    0x46, 0x76, 0x01, //     PHYSICAL_MAXIMUM (374)
    0x55, 0x0E,       //     UNIT_EXPONENT (-2)
    0x65, 0x33,       //     UNIT (Eng Lin: inch)
    0x09, 0x30,       //     USAGE (X)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x26, 0x10, 0x01, //     LOGICAL_MAXIMUM (272)
    0x46, 0xD4, 0x00, //     PHYSICAL_MAXIMUM (212)
    0x09, 0x31,       //     USAGE (Y)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xB4,             //     POP
    0xC0,             //   END_COLLECTION

    // contact 2
    0x05, 0x0D,       //   USAGE_PAGE (Digitizers)
    0x09, 0x22,       //   USAGE (Finger)
    0xA1, 0x02,       //   COLLECTION (Logical)
    0x09, 0x42,       //     USAGE (Tip Switch)
    0x15, 0x00,       //     LOGICAL_MINIMUM (0)
    0x25, 0x01,       //     LOGICAL_MAXIMUM (1)
    0x75, 0x01,       //     REPORT_SIZE (1)
    0x95, 0x01,       //     REPORT_COUNT (1)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x81, 0x03,       //     INPUT (Cnst,Var,Abs)
    0x75, 0x06,       //     REPORT_SIZE (6)
    0x25, 0x3F,       //     LOGICAL_MAXIMUM (63)
    0x09, 0x51,       //     USAGE (Contact Identifier)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xA4,             //     PUSH
    0x05, 0x01,       //     USAGE_PAGE (Generic Desktop)
    0x75, 0x10,       //     REPORT_SIZE (16)
    0x26, 0xE0, 0x01, //     LOGICAL_MAXIMUM (480)
    0x46, 0x76, 0x01, //     PHYSICAL_MAXIMUM (374)
    0x55, 0x0E,       //     UNIT_EXPONENT (-2)
    0x65, 0x33,       //     UNIT (Eng Lin: inch)
    0x09, 0x30,       //     USAGE (X)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x26, 0x10, 0x01, //     LOGICAL_MAXIMUM (272)
    0x46, 0xD4, 0x00, //     PHYSICAL_MAXIMUM (212)
    0x09, 0x31,       //     USAGE (Y)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xB4,             //     POP
    0xC0,             //   END_COLLECTION

    // contact 3
    0x05, 0x0D,       //   USAGE_PAGE (Digitizers)
    0x09, 0x22,       //   USAGE (Finger)
    0xA1, 0x02,       //   COLLECTION (Logical)
    0x09, 0x42,       //     USAGE (Tip Switch)
    0x15, 0x00,       //     LOGICAL_MINIMUM (0)
    0x25, 0x01,       //     LOGICAL_MAXIMUM (1)
    0x75, 0x01,       //     REPORT_SIZE (1)
    0x95, 0x01,       //     REPORT_COUNT (1)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x81, 0x03,       //     INPUT (Cnst,Var,Abs)
    0x75, 0x06,       //     REPORT_SIZE (6)
    0x25, 0x3F,       //     LOGICAL_MAXIMUM (63)
    0x09, 0x51,       //     USAGE (Contact Identifier)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xA4,             //     PUSH
    0x05, 0x01,       //     USAGE_PAGE (Generic Desktop)
    0x75, 0x10,       //     REPORT_SIZE (16)
    0x26, 0xE0, 0x01, //     LOGICAL_MAXIMUM (480)
    0x46, 0x76, 0x01, //     PHYSICAL_MAXIMUM (374)
    0x55, 0x0E,       //     UNIT_EXPONENT (-2)
    0x65, 0x33,       //     UNIT (Eng Lin: inch)
    0x09, 0x30,       //     USAGE (X)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x26, 0x10, 0x01, //     LOGICAL_MAXIMUM (272)
    0x46, 0xD4, 0x00, //     PHYSICAL_MAXIMUM (212)
    0x09, 0x31,       //     USAGE (Y)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xB4,             //     POP
    0xC0,             //   END_COLLECTION

    // contact 4
    0x05, 0x0D,       //   USAGE_PAGE (Digitizers)
    0x09, 0x22,       //   USAGE (Finger)
    0xA1, 0x02,       //   COLLECTION (Logical)
    0x09, 0x42,       //     USAGE (Tip Switch)
    0x15, 0x00,       //     LOGICAL_MINIMUM (0)
    0x25, 0x01,       //     LOGICAL_MAXIMUM (1)
    0x75, 0x01,       //     REPORT_SIZE (1)
    0x95, 0x01,       //     REPORT_COUNT (1)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x81, 0x03,       //     INPUT (Cnst,Var,Abs)
    0x75, 0x06,       //     REPORT_SIZE (6)
    0x25, 0x3F,       //     LOGICAL_MAXIMUM (63)
    0x09, 0x51,       //     USAGE (Contact Identifier)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xA4,             //     PUSH
    0x05, 0x01,       //     USAGE_PAGE (Generic Desktop)
    0x75, 0x10,       //     REPORT_SIZE (16)
    0x26, 0xE0, 0x01, //     LOGICAL_MAXIMUM (480)
    0x46, 0x76, 0x01, //     PHYSICAL_MAXIMUM (374)
    0x55, 0x0E,       //     UNIT_EXPONENT (-2)
    0x65, 0x33,       //     UNIT (Eng Lin: inch)
    0x09, 0x30,       //     USAGE (X)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x26, 0x10, 0x01, //     LOGICAL_MAXIMUM (272)
    0x46, 0xD4, 0x00, //     PHYSICAL_MAXIMUM (212)
    0x09, 0x31,       //     USAGE (Y)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xB4,             //     POP
    0xC0,             //   END_COLLECTION

    // contact 5
    0x05, 0x0D,       //   USAGE_PAGE (Digitizers)
    0x09, 0x22,       //   USAGE (Finger)
    0xA1, 0x02,       //   COLLECTION (Logical)
    0x09, 0x42,       //     USAGE (Tip Switch)
    0x15, 0x00,       //     LOGICAL_MINIMUM (0)
    0x25, 0x01,       //     LOGICAL_MAXIMUM (1)
    0x75, 0x01,       //     REPORT_SIZE (1)
    0x95, 0x01,       //     REPORT_COUNT (1)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x81, 0x03,       //     INPUT (Cnst,Var,Abs)
    0x75, 0x06,       //     REPORT_SIZE (6)
    0x25, 0x3F,       //     LOGICAL_MAXIMUM (63)
    0x09, 0x51,       //     USAGE (Contact Identifier)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xA4,             //     PUSH
    0x05, 0x01,       //     USAGE_PAGE (Generic Desktop)
    0x75, 0x10,       //     REPORT_SIZE (16)
    0x26, 0xE0, 0x01, //     LOGICAL_MAXIMUM (480)
    0x46, 0x76, 0x01, //     PHYSICAL_MAXIMUM (374)
    0x55, 0x0E,       //     UNIT_EXPONENT (-2)
    0x65, 0x33,       //     UNIT (Eng Lin: inch)
    0x09, 0x30,       //     USAGE (X)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0x26, 0x10, 0x01, //     LOGICAL_MAXIMUM (272)
    0x46, 0xD4, 0x00, //     PHYSICAL_MAXIMUM (212)
    0x09, 0x31,       //     USAGE (Y)
    0x81, 0x02,       //     INPUT (Data,Var,Abs)
    0xB4,             //     POP
    0xC0,             //   END_COLLECTION

    0x05, 0x0D,       //   USAGE_PAGE (Digitizers)
    0x09, 0x54,       //   USAGE (Contact Count)
    0x95, 0x01,       //   REPORT_COUNT (1)
    0x75, 0x08,       //   REPORT_SIZE (8)
    0x25, 0x05,       //   LOGICAL_MAXIMUM (5)
    0x81, 0x02,       //   INPUT (Data,Var,Abs)
    0x85, 0x02,       //   REPORT_ID (2)
    0x09, 0x55,       //   USAGE (Contact Count Maximum)
    0xB1, 0x02,       //   FEATURE (Data,Var,Abs)
    0xC0,             // END_COLLECTION
];

/// The HID digitizer interface: one interrupt IN endpoint plus the class
/// control plumbing.
pub struct MultiTouchHid<'a, B: UsbBus> {
    interface: InterfaceNumber,
    ep_in: EndpointIn<'a, B>,
    /// Copy of the last pushed report, served on Get_Report(Input).
    last_report: [u8; INPUT_REPORT_LEN],
    in_flight: bool,
    protocol: u8,
    idle: u8,
}

impl<'a, B: UsbBus> MultiTouchHid<'a, B> {
    pub fn new(alloc: &'a UsbBusAllocator<B>) -> MultiTouchHid<'a, B> {
        MultiTouchHid {
            interface: alloc.interface(),
            ep_in: alloc.interrupt(MAX_PACKET_SIZE, POLL_INTERVAL_MS),
            last_report: [0; INPUT_REPORT_LEN],
            in_flight: false,
            protocol: 1, // report protocol
            idle: 0,
        }
    }
}

impl<B: UsbBus> UsbClass<B> for MultiTouchHid<'_, B> {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> UsbResult<()> {
        writer.interface(self.interface, INTERFACE_CLASS_HID, 0, 0)?;

        let descriptor_len = REPORT_DESCRIPTOR.len();
        writer.write(
            DESCRIPTOR_TYPE_HID,
            &[
                0x11,
                0x01, // bcdHID 1.11
                0x00, // country code: not supported
                0x01, // one class descriptor follows
                DESCRIPTOR_TYPE_REPORT,
                descriptor_len as u8,
                (descriptor_len >> 8) as u8,
            ],
        )?;

        writer.endpoint(&self.ep_in)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.in_flight = false;
        self.protocol = 1;
        self.idle = 0;
    }

    fn endpoint_in_complete(&mut self, addr: EndpointAddress) {
        if addr == self.ep_in.address() {
            self.in_flight = false;
        }
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let (request_type, recipient, request, value, index) = {
            let req = xfer.request();
            (
                req.request_type,
                req.recipient,
                req.request,
                req.value,
                req.index,
            )
        };
        if index != u16::from(u8::from(self.interface)) {
            return;
        }

        match (request_type, recipient) {
            (RequestType::Standard, Recipient::Interface) => {
                if request == Request::GET_DESCRIPTOR {
                    match (value >> 8) as u8 {
                        DESCRIPTOR_TYPE_REPORT => {
                            xfer.accept_with_static(REPORT_DESCRIPTOR).ok();
                        }
                        DESCRIPTOR_TYPE_HID => {
                            let descriptor_len = REPORT_DESCRIPTOR.len();
                            xfer.accept_with(&[
                                0x09,
                                DESCRIPTOR_TYPE_HID,
                                0x11,
                                0x01,
                                0x00,
                                0x01,
                                DESCRIPTOR_TYPE_REPORT,
                                descriptor_len as u8,
                                (descriptor_len >> 8) as u8,
                            ])
                            .ok();
                        }
                        _ => {}
                    }
                }
            }
            (RequestType::Class, Recipient::Interface) => match request {
                HID_REQ_GET_REPORT => {
                    let report_type = (value >> 8) as u8;
                    let report_id = value as u8;
                    match (report_type, report_id) {
                        (REPORT_TYPE_INPUT, INPUT_REPORT_ID) => {
                            xfer.accept_with(&self.last_report).ok();
                        }
                        (REPORT_TYPE_FEATURE, FEATURE_REPORT_ID) => {
                            xfer.accept_with(&hid::feature_report()).ok();
                        }
                        _ => {
                            xfer.reject().ok();
                        }
                    }
                }
                HID_REQ_GET_IDLE => {
                    xfer.accept_with(&[self.idle]).ok();
                }
                HID_REQ_GET_PROTOCOL => {
                    xfer.accept_with(&[self.protocol]).ok();
                }
                _ => {
                    xfer.reject().ok();
                }
            },
            _ => {}
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let (request_type, recipient, request, value, index) = {
            let req = xfer.request();
            (
                req.request_type,
                req.recipient,
                req.request,
                req.value,
                req.index,
            )
        };
        if request_type != RequestType::Class
            || recipient != Recipient::Interface
            || index != u16::from(u8::from(self.interface))
        {
            return;
        }

        match request {
            HID_REQ_SET_IDLE => {
                self.idle = (value >> 8) as u8;
                xfer.accept().ok();
            }
            HID_REQ_SET_PROTOCOL => {
                self.protocol = value as u8;
                xfer.accept().ok();
            }
            // no output or feature reports flow towards the device
            HID_REQ_SET_REPORT => {
                xfer.reject().ok();
            }
            _ => {
                xfer.reject().ok();
            }
        }
    }
}

impl<B: UsbBus> ReportSink for MultiTouchHid<'_, B> {
    fn busy(&self) -> bool {
        self.in_flight
    }

    fn try_send(&mut self, report: &[u8]) -> Result<(), SendError> {
        match self.ep_in.write(report) {
            Ok(_) => {
                self.in_flight = true;
                self.last_report[..report.len()].copy_from_slice(report);
                Ok(())
            }
            Err(UsbError::WouldBlock) => Err(SendError::Busy),
            Err(_) => Err(SendError::Inactive),
        }
    }
}
