//! Display backlight: an enable line plus a PWM dimmer on TIM12 channel 1
//! (PH6, AF9).
//!
//! Fully independent of the touch pipeline; no data flows back.

use crate::gpio::OutputPin;
use stm32f7::stm32f7x6::{RCC, TIM12};

/// 8-bit duty range: the compare register is driven directly by the level.
const MAX_LEVEL: u32 = 0xFF;
/// APB1 timers run at 2 x 54 MHz; 108 MHz / ((422 + 1) * 256) is roughly a
/// 1 kHz PWM carrier.
const PRESCALER: u32 = 422;

// CCMR1: OC1M = PWM mode 1, preload enable
const CCMR1_PWM1_PRELOAD: u32 = 0b110 << 4 | 1 << 3;
// CCER: capture/compare 1 output enable
const CCER_CC1E: u32 = 1 << 0;
// CR1: auto-reload preload + counter enable
const CR1_ARPE: u32 = 1 << 7;
const CR1_CEN: u32 = 1 << 0;
// EGR: update generation
const EGR_UG: u32 = 1 << 0;

pub struct Backlight {
    tim: TIM12,
    enable: OutputPin,
    level: u8,
}

pub fn init(tim: TIM12, rcc: &mut RCC, enable: OutputPin) -> Backlight {
    rcc.apb1enr.modify(|_, w| w.tim12en().set_bit());
    rcc.apb1enr.read(); // delay

    tim.psc.write(|w| unsafe { w.bits(PRESCALER) });
    tim.arr.write(|w| unsafe { w.bits(MAX_LEVEL) });
    tim.ccr1.write(|w| unsafe { w.bits(MAX_LEVEL) });
    tim.ccmr1_output
        .write(|w| unsafe { w.bits(CCMR1_PWM1_PRELOAD) });
    tim.ccer.write(|w| unsafe { w.bits(CCER_CC1E) });
    // load prescaler and reload value
    tim.egr.write(|w| unsafe { w.bits(EGR_UG) });
    tim.cr1.write(|w| unsafe { w.bits(CR1_ARPE | CR1_CEN) });

    let mut backlight = Backlight {
        tim,
        enable,
        level: 0xFF,
    };
    backlight.disable();
    backlight
}

impl Backlight {
    pub fn enable(&mut self) {
        self.enable.set(true);
    }

    pub fn disable(&mut self) {
        self.enable.set(false);
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn set_level(&mut self, level: u8) {
        self.level = level;
        self.tim.ccr1.write(|w| unsafe { w.bits(u32::from(level)) });
    }

    pub fn increase_level(&mut self) {
        let level = self.level.saturating_add(1);
        self.set_level(level);
    }

    pub fn decrease_level(&mut self) {
        let level = self.level.saturating_sub(1);
        self.set_level(level);
    }
}
