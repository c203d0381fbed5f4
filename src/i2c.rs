//! Blocking driver for the I2C3 bus.
//!
//! Transactions are driven byte by byte against the peripheral's status
//! flags. Register reads use the write-then-repeated-start-then-read
//! sequence: the register address is transmitted first, then a new start in
//! read direction is issued without releasing the bus, and the requested
//! number of bytes is clocked in (the controller NACKs the final byte and the
//! explicit stop ends the transaction).
//!
//! Every status poll is bounded by [`POLL_LIMIT`]; a bus that stops making
//! progress yields [`Error::Timeout`] instead of hanging the calling context.

use crate::system_clock;
use stm32f7::stm32f7x6::{I2C3, RCC};

/// Register polls before a stuck bus is reported.
const POLL_LIMIT: u32 = 100_000;

// ISR status bits
const ISR_TXE: u32 = 1 << 0;
const ISR_TXIS: u32 = 1 << 1;
const ISR_RXNE: u32 = 1 << 2;
const ISR_NACKF: u32 = 1 << 4;
const ISR_STOPF: u32 = 1 << 5;
const ISR_TC: u32 = 1 << 6;

// CR2 fields
const CR2_RD_WRN: u32 = 1 << 10;
const CR2_START: u32 = 1 << 13;
const CR2_STOP: u32 = 1 << 14;
const CR2_NBYTES_SHIFT: u32 = 16;

// ICR write-one-to-clear bits: ADDR, NACK, STOP, BERR, ARLO, OVR, PEC,
// TIMEOUT, ALERT
const ICR_CLEAR_ALL: u32 = 0b11_1111_0011_1000;

/// Timing register value for roughly 100 kHz with a 54 MHz APB1 clock:
/// PRESC 0x4, SCLDEL 0x9, SDADEL 0x1, SCLH 0x27, SCLL 0x32.
const TIMING: u32 = 0x4 << 28 | 0x9 << 20 | 0x1 << 16 | 0x27 << 8 | 0x32;

pub struct I2C(I2C3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The peripheral did not acknowledge an address or data byte.
    Nack,
    /// A status flag did not arrive within [`POLL_LIMIT`] polls.
    Timeout,
}

#[derive(Debug, Clone, Copy)]
pub struct Address(u16);

impl Address {
    pub const fn bits_7(addr: u8) -> Address {
        Address((addr as u16) << 1)
    }
}

pub fn init(i2c: I2C3, rcc: &mut RCC) -> I2C {
    rcc.apb1enr.modify(|_, w| w.i2c3en().set_bit());
    rcc.apb1enr.read(); // delay

    // disable peripheral during configuration
    i2c.cr1.modify(|_, w| w.pe().clear_bit());
    i2c.timingr.write(|w| unsafe { w.bits(TIMING) });
    // no own address, 7-bit addressing, manual end mode
    i2c.oar1.write(|w| unsafe { w.bits(0) });
    i2c.oar2.write(|w| unsafe { w.bits(0) });
    i2c.cr2.write(|w| unsafe { w.bits(0) });
    i2c.cr1.modify(|_, w| w.pe().set_bit());
    // wait that init can finish
    system_clock::wait(50);
    I2C(i2c)
}

/// An open connection to one bus peripheral.
///
/// Created through [`I2C::connect`], which issues the stop condition when the
/// closure returns.
pub struct I2cConnection<'a> {
    i2c: &'a mut I2C,
    device_address: Address,
}

impl I2cConnection<'_> {
    fn start(&mut self, read: bool, bytes: u8) {
        let mut cr2 = u32::from(self.device_address.0);
        if read {
            cr2 |= CR2_RD_WRN;
        }
        cr2 |= u32::from(bytes) << CR2_NBYTES_SHIFT;
        cr2 |= CR2_START;
        self.i2c.0.cr2.write(|w| unsafe { w.bits(cr2) });
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        assert!(bytes.len() <= 255, "transfers > 255 bytes are not implemented");
        self.start(false, bytes.len() as u8);

        for &b in bytes {
            self.i2c.wait_for_flag(ISR_TXIS)?;
            self.i2c.0.txdr.write(|w| unsafe { w.bits(u32::from(b)) });
        }

        self.i2c.wait_for_flag(ISR_TC)?;
        self.clear_status_flags();
        Ok(())
    }

    fn read_bytes_raw(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        assert!(
            buffer.len() <= 255,
            "transfers > 255 bytes are not implemented"
        );
        self.start(true, buffer.len() as u8);

        for b in buffer {
            self.i2c.wait_for_flag(ISR_RXNE)?;
            *b = self.i2c.0.rxdr.read().bits() as u8;
        }

        self.i2c.wait_for_flag(ISR_TC)?;
        self.clear_status_flags();
        Ok(())
    }

    fn pre(&mut self) {
        self.clear_status_flags();
        // flush transmit data register
        self.i2c
            .0
            .isr
            .modify(|r, w| unsafe { w.bits(r.bits() | ISR_TXE) });
    }

    fn clear_status_flags(&mut self) {
        self.i2c.0.icr.write(|w| unsafe { w.bits(ICR_CLEAR_ALL) });
    }

    /// Read a single byte wide register.
    pub fn read_register(&mut self, register_address: u8) -> Result<u8, Error> {
        let mut buf = [0];
        self.read_registers(register_address, &mut buf)?;
        Ok(buf[0])
    }

    /// Read `buffer.len()` consecutive registers starting at
    /// `register_address`.
    pub fn read_registers(
        &mut self,
        register_address: u8,
        buffer: &mut [u8],
    ) -> Result<(), Error> {
        self.pre();
        self.write_bytes(&[register_address])?;
        self.read_bytes_raw(buffer)
    }

    pub fn write_register(&mut self, register_address: u8, value: u8) -> Result<(), Error> {
        self.pre();
        self.write_bytes(&[register_address, value])
    }
}

impl I2C {
    /// Run `f` with an open connection to `device_address` and issue the stop
    /// condition afterwards, also on the error paths.
    pub fn connect<F, R>(&mut self, device_address: Address, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut I2cConnection<'_>) -> Result<R, Error>,
    {
        let result = {
            let mut conn = I2cConnection {
                i2c: self,
                device_address,
            };
            f(&mut conn)
        };
        match result {
            Ok(value) => {
                self.stop()?;
                Ok(value)
            }
            Err(err) => {
                // best effort; the transaction error is the interesting one
                let _ = self.stop();
                Err(err)
            }
        }
    }

    pub fn stop(&mut self) -> Result<(), Error> {
        self.0
            .cr2
            .modify(|r, w| unsafe { w.bits(r.bits() | CR2_STOP) });
        let result = self.wait_for_flag(ISR_STOPF);
        self.0.icr.write(|w| unsafe { w.bits(ICR_CLEAR_ALL) });
        self.0.cr2.write(|w| unsafe { w.bits(0) });
        result
    }

    fn wait_for_flag(&self, flag: u32) -> Result<(), Error> {
        for _ in 0..POLL_LIMIT {
            let isr = self.0.isr.read().bits();
            if isr & ISR_NACKF != 0 {
                return Err(Error::Nack);
            }
            if isr & flag != 0 {
                return Ok(());
            }
        }
        Err(Error::Timeout)
    }
}
