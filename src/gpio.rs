//! GPIO port and pin configuration.
//!
//! Every GPIO block of the STM32F7 shares the same register layout, so the
//! port wrapper works on a single register-block type and the peripheral
//! structs are only used to prove ownership of a port. Pins that have been
//! handed out are tracked per port, so configuring the same pin twice is
//! reported instead of silently reprogramming it.

use stm32f7::stm32f7x6::{
    gpioa, GPIOA, GPIOB, GPIOC, GPIOD, GPIOE, GPIOF, GPIOG, GPIOH, GPIOI, GPIOJ, GPIOK,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    PushPull,
    OpenDrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSpeed {
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resistor {
    NoPull,
    PullUp,
    PullDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AlternateFunction {
    AF0,
    AF1,
    AF2,
    AF3,
    AF4,
    AF5,
    AF6,
    AF7,
    AF8,
    AF9,
    AF10,
    AF11,
    AF12,
    AF13,
    AF14,
    AF15,
}

/// A GPIO peripheral that can be turned into a [`GpioPort`].
pub trait GpioInstance {
    fn base(self) -> *const gpioa::RegisterBlock;
}

macro_rules! gpio_instance {
    ($($gpio:ty),*) => {
        $(
            impl GpioInstance for $gpio {
                fn base(self) -> *const gpioa::RegisterBlock {
                    // consuming the peripheral proves exclusive ownership of
                    // the port; the register blocks all share one layout
                    &*self as *const _ as *const gpioa::RegisterBlock
                }
            }
        )*
    }
}

gpio_instance!(GPIOA, GPIOB, GPIOC, GPIOD, GPIOE, GPIOF, GPIOG, GPIOH, GPIOI, GPIOJ, GPIOK);

#[derive(Debug)]
pub struct PinAlreadyInUseError(pub u8);

pub struct GpioPort {
    regs: *const gpioa::RegisterBlock,
    taken: u16,
}

unsafe impl Send for GpioPort {}

impl GpioPort {
    pub fn new(instance: impl GpioInstance) -> GpioPort {
        GpioPort {
            regs: instance.base(),
            taken: 0,
        }
    }

    pub fn to_input(&mut self, pin: u8, resistor: Resistor) -> Result<InputPin, PinAlreadyInUseError> {
        self.take(pin)?;
        let regs = self.registers();
        regs.pupdr
            .modify(|r, w| unsafe { w.bits(set_two_bits(r.bits(), pin, resistor as u32)) });
        regs.moder
            .modify(|r, w| unsafe { w.bits(set_two_bits(r.bits(), pin, MODE_INPUT)) });
        Ok(InputPin {
            regs: self.regs,
            pin,
        })
    }

    pub fn to_output(
        &mut self,
        pin: u8,
        typ: OutputType,
        speed: OutputSpeed,
        resistor: Resistor,
    ) -> Result<OutputPin, PinAlreadyInUseError> {
        self.take(pin)?;
        let regs = self.registers();
        regs.otyper
            .modify(|r, w| unsafe { w.bits(set_one_bit(r.bits(), pin, typ as u32)) });
        regs.ospeedr
            .modify(|r, w| unsafe { w.bits(set_two_bits(r.bits(), pin, speed as u32)) });
        regs.pupdr
            .modify(|r, w| unsafe { w.bits(set_two_bits(r.bits(), pin, resistor as u32)) });
        regs.moder
            .modify(|r, w| unsafe { w.bits(set_two_bits(r.bits(), pin, MODE_OUTPUT)) });
        Ok(OutputPin {
            regs: self.regs,
            pin,
        })
    }

    pub fn to_alternate_function(
        &mut self,
        pin: u8,
        typ: OutputType,
        speed: OutputSpeed,
        alternate_fn: AlternateFunction,
        resistor: Resistor,
    ) -> Result<(), PinAlreadyInUseError> {
        self.take(pin)?;
        let regs = self.registers();
        regs.otyper
            .modify(|r, w| unsafe { w.bits(set_one_bit(r.bits(), pin, typ as u32)) });
        regs.ospeedr
            .modify(|r, w| unsafe { w.bits(set_two_bits(r.bits(), pin, speed as u32)) });
        regs.pupdr
            .modify(|r, w| unsafe { w.bits(set_two_bits(r.bits(), pin, resistor as u32)) });
        if pin < 8 {
            regs.afrl
                .modify(|r, w| unsafe { w.bits(set_four_bits(r.bits(), pin, alternate_fn as u32)) });
        } else {
            regs.afrh.modify(|r, w| unsafe {
                w.bits(set_four_bits(r.bits(), pin - 8, alternate_fn as u32))
            });
        }
        regs.moder
            .modify(|r, w| unsafe { w.bits(set_two_bits(r.bits(), pin, MODE_ALTERNATE)) });
        Ok(())
    }

    fn take(&mut self, pin: u8) -> Result<(), PinAlreadyInUseError> {
        assert!(pin < 16);
        if self.taken & (1 << pin) != 0 {
            return Err(PinAlreadyInUseError(pin));
        }
        self.taken |= 1 << pin;
        Ok(())
    }

    fn registers(&self) -> &gpioa::RegisterBlock {
        unsafe { &*self.regs }
    }
}

const MODE_INPUT: u32 = 0b00;
const MODE_OUTPUT: u32 = 0b01;
const MODE_ALTERNATE: u32 = 0b10;

fn set_one_bit(value: u32, pin: u8, bit: u32) -> u32 {
    (value & !(0b1 << pin)) | (bit << pin)
}

fn set_two_bits(value: u32, pin: u8, bits: u32) -> u32 {
    let shift = u32::from(pin) * 2;
    (value & !(0b11 << shift)) | (bits << shift)
}

fn set_four_bits(value: u32, pin: u8, bits: u32) -> u32 {
    let shift = u32::from(pin) * 4;
    (value & !(0b1111 << shift)) | (bits << shift)
}

pub struct InputPin {
    regs: *const gpioa::RegisterBlock,
    pin: u8,
}

unsafe impl Send for InputPin {}

impl InputPin {
    pub fn get(&self) -> bool {
        let idr = unsafe { &*self.regs }.idr.read().bits();
        idr & (1 << self.pin) != 0
    }
}

pub struct OutputPin {
    regs: *const gpioa::RegisterBlock,
    pin: u8,
}

unsafe impl Send for OutputPin {}

impl OutputPin {
    pub fn get(&self) -> bool {
        let odr = unsafe { &*self.regs }.odr.read().bits();
        odr & (1 << self.pin) != 0
    }

    pub fn set(&mut self, value: bool) {
        // bsrr: lower half sets, upper half resets; writing is atomic so no
        // read-modify-write of odr is needed
        let bit = if value {
            1 << self.pin
        } else {
            1 << (self.pin + 16)
        };
        unsafe { &*self.regs }.bsrr.write(|w| unsafe { w.bits(bit) });
    }

    pub fn toggle(&mut self) {
        let value = !self.get();
        self.set(value);
    }
}
