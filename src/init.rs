//! Clock tree, SysTick and pin bring-up.

use crate::gpio::{AlternateFunction, GpioPort, OutputPin, OutputSpeed, OutputType, Resistor};
use cortex_m::peripheral::SYST;
use stm32f7::stm32f7x6::{FLASH, PWR, RCC};

pub const SYSTEM_CLOCK_HZ: u32 = 216_000_000;
/// AHB clock; equals the system clock (no AHB prescaler).
pub const HCLK_HZ: u32 = SYSTEM_CLOCK_HZ;

pub fn init_system_clock_216mhz(rcc: &mut RCC, pwr: &mut PWR, flash: &mut FLASH) {
    // enable power control clock
    rcc.apb1enr.modify(|_, w| w.pwren().enabled());
    rcc.apb1enr.read(); // delay

    // reset HSEON and HSEBYP bits before configuring HSE
    rcc.cr.modify(|_, w| {
        w.hseon().clear_bit();
        w.hsebyp().clear_bit();
        w
    });
    // wait until HSE is disabled
    while rcc.cr.read().hserdy().bit_is_set() {}
    // turn HSE on
    rcc.cr.modify(|_, w| w.hseon().set_bit());
    // wait until HSE is enabled
    while rcc.cr.read().hserdy().bit_is_clear() {}

    // disable main PLL
    rcc.cr.modify(|_, w| w.pllon().clear_bit());
    while rcc.cr.read().pllrdy().bit_is_set() {}

    // Configure the main PLL. HSE runs at 25 MHz.
    // VCO input = 25 MHz / PLLM = 1 MHz; VCO output = 1 MHz * PLLN = 432 MHz.
    // System clock = 432 MHz / PLLP = 216 MHz.
    // PLLQ = 9 puts the 48 MHz clock the OTG_FS peripheral needs on PLL48CLK.
    rcc.pllcfgr.modify(|_, w| {
        w.pllsrc().hse();
        w.pllp().div2();
        unsafe {
            w.pllm().bits(25);
            w.plln().bits(432);
            w.pllq().bits(9);
        }
        w
    });
    // enable main PLL
    rcc.cr.modify(|_, w| w.pllon().set_bit());
    while rcc.cr.read().pllrdy().bit_is_clear() {}

    // enable overdrive
    pwr.cr1.modify(|_, w| w.oden().set_bit());
    while pwr.csr1.read().odrdy().bit_is_clear() {}
    // enable overdrive switching
    pwr.cr1.modify(|_, w| w.odswen().set_bit());
    while pwr.csr1.read().odswrdy().bit_is_clear() {}

    // flash wait states for 216 MHz
    flash.acr.modify(|_, w| w.latency().bits(5));
    assert_eq!(flash.acr.read().latency().bits(), 5);

    // HCLK = system clock / 1
    rcc.cfgr.modify(|_, w| w.hpre().div1());
    // switch the system clock to the PLL
    rcc.cfgr.modify(|_, w| w.sw().pll());
    while !rcc.cfgr.read().sws().is_pll() {}

    // APB1 = 216 MHz / 4 = 54 MHz, APB2 = 216 MHz / 2 = 108 MHz
    rcc.cfgr.modify(|_, w| w.ppre1().div4());
    rcc.cfgr.modify(|_, w| w.ppre2().div2());
}

pub fn enable_gpio_ports(rcc: &mut RCC) {
    rcc.ahb1enr.modify(|_, w| {
        w.gpioaen().set_bit();
        w.gpiohen().set_bit();
        w.gpioien().set_bit();
        w.gpioken().set_bit();
        w
    });
    rcc.ahb1enr.read(); // delay
}

pub fn enable_syscfg(rcc: &mut RCC) {
    rcc.apb2enr.modify(|_, w| w.syscfgen().set_bit());
    rcc.apb2enr.read(); // delay
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Hz(pub u32);

/// Configure the system timer to fire the SysTick exception at `frequency`.
pub fn init_systick(Hz(frequency): Hz, systick: &mut SYST) {
    use cortex_m::peripheral::syst::SystClkSource;

    let reload_ticks = SYSTEM_CLOCK_HZ / frequency;
    systick.set_clock_source(SystClkSource::Core);
    systick.set_reload(reload_ticks - 1);
    systick.clear_current();
    systick.enable_counter();
}

/// The board pins this firmware keeps a handle to.
pub struct Pins {
    /// Status LED, toggled per published report.
    pub led: OutputPin,
    /// Touch sensor wake line, driven high to take the controller out of
    /// hibernate.
    pub touch_wake: OutputPin,
    /// Backlight enable line (the PWM dimmer runs on PH6/TIM12).
    pub backlight_enable: OutputPin,
}

/// Initializes the pin mapping.
///
/// Besides the returned handles this configures pins that are afterwards
/// owned by their peripherals: PH7/PH8 for I2C3, PH6 for the TIM12 PWM,
/// PI13 as the touch data-ready input, and PA11/PA12 for the OTG_FS core.
pub fn pins(
    mut gpio_a: GpioPort,
    mut gpio_h: GpioPort,
    mut gpio_i: GpioPort,
    mut gpio_k: GpioPort,
) -> Pins {
    let led = gpio_i
        .to_output(1, OutputType::PushPull, OutputSpeed::Low, Resistor::NoPull)
        .expect("led pin I-1 already in use");
    let touch_wake = gpio_i
        .to_output(8, OutputType::PushPull, OutputSpeed::Low, Resistor::NoPull)
        .expect("touch wake pin I-8 already in use");
    let backlight_enable = gpio_k
        .to_output(3, OutputType::PushPull, OutputSpeed::Low, Resistor::NoPull)
        .expect("backlight pin K-3 already in use");

    // touch controller data-ready line, falling edge active
    gpio_i
        .to_input(13, Resistor::PullUp)
        .expect("touch interrupt pin I-13 already in use");

    // i2c3 scl/sda
    for pin in &[7, 8] {
        gpio_h
            .to_alternate_function(
                *pin,
                OutputType::OpenDrain,
                OutputSpeed::Medium,
                AlternateFunction::AF4,
                Resistor::PullUp,
            )
            .expect("i2c3 pin already in use");
    }

    // backlight pwm, tim12 channel 1
    gpio_h
        .to_alternate_function(
            6,
            OutputType::PushPull,
            OutputSpeed::Low,
            AlternateFunction::AF9,
            Resistor::NoPull,
        )
        .expect("backlight pwm pin H-6 already in use");

    // otg_fs data lines
    for pin in &[11, 12] {
        gpio_a
            .to_alternate_function(
                *pin,
                OutputType::PushPull,
                OutputSpeed::VeryHigh,
                AlternateFunction::AF10,
                Resistor::NoPull,
            )
            .expect("otg_fs pin already in use");
    }

    Pins {
        led,
        touch_wake,
        backlight_enable,
    }
}
