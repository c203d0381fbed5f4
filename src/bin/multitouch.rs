//! USB HID multi-touch digitizer firmware.
//!
//! Top half: the EXTI15_10 interrupt masks the touch controller's data-ready
//! line and records the event. Bottom half: the main loop polls the USB
//! device, consumes the event, runs one acquisition cycle and re-arms the
//! line. The line stays masked for the whole cycle, so the blocking bus
//! transaction can never be re-entered.

#![no_main]
#![no_std]

extern crate cortex_m;
extern crate cortex_m_rt as rt;
extern crate cortex_m_semihosting as sh;
#[macro_use]
extern crate stm32f7;
extern crate stm32f7_multitouch;
extern crate usb_device;

use core::cell::RefCell;
use core::fmt::Write;
use core::panic::PanicInfo;
use cortex_m::{asm, interrupt, interrupt::Mutex};
use rt::{entry, exception, ExceptionFrame};
use sh::hio;
use stm32f7::stm32f7x6::{CorePeripherals, Interrupt, Peripherals};
use stm32f7_multitouch::{
    backlight,
    digitizer::{DataReady, Digitizer},
    exti::{EdgeDetection, Exti, ExtiHandle, Port},
    gpio::GpioPort,
    hid::{Publish, ReportSink},
    i2c,
    init::{self, Hz},
    system_clock, touch,
    usb::{self, MultiTouchHid, UsbBusType, UsbFs},
};
use usb_device::bus::UsbBusAllocator;
use usb_device::device::{UsbDeviceBuilder, UsbDeviceState};

/// Depth-1 hand-off from the data-ready ISR to the main loop.
static TOUCH_READY: DataReady = DataReady::new();
/// The registered data-ready line, shared between the ISR (mask) and the
/// main loop (re-arm).
static TOUCH_INT: Mutex<RefCell<Option<ExtiHandle>>> = Mutex::new(RefCell::new(None));

static mut EP_MEMORY: [u32; usb::EP_MEMORY_WORDS] = [0; usb::EP_MEMORY_WORDS];
static mut USB_BUS: Option<UsbBusAllocator<UsbBusType>> = None;

#[entry]
fn main() -> ! {
    let core_peripherals = CorePeripherals::take().unwrap();
    let mut systick = core_peripherals.SYST;
    let mut nvic = core_peripherals.NVIC;

    let peripherals = Peripherals::take().unwrap();
    let mut rcc = peripherals.RCC;
    let mut pwr = peripherals.PWR;
    let mut flash = peripherals.FLASH;
    let mut syscfg = peripherals.SYSCFG;

    init::init_system_clock_216mhz(&mut rcc, &mut pwr, &mut flash);
    init::enable_gpio_ports(&mut rcc);
    init::enable_syscfg(&mut rcc);

    let gpio_a = GpioPort::new(peripherals.GPIOA);
    let gpio_h = GpioPort::new(peripherals.GPIOH);
    let gpio_i = GpioPort::new(peripherals.GPIOI);
    let gpio_k = GpioPort::new(peripherals.GPIOK);
    let mut pins = init::pins(gpio_a, gpio_h, gpio_i, gpio_k);

    // SysTick at 1 kHz, one tick per millisecond
    init::init_systick(Hz(1000), &mut systick);
    systick.enable_interrupt();

    let mut i2c_3 = i2c::init(peripherals.I2C3, &mut rcc);

    // wake the sensor and give it time to calibrate before talking to it
    pins.touch_wake.set(true);
    system_clock::wait(300);
    touch::check_family_id(&mut i2c_3).expect("touch controller not responding");

    let mut backlight = backlight::init(peripherals.TIM12, &mut rcc, pins.backlight_enable);
    backlight.enable();

    // register the data-ready line before unmasking it in the NVIC
    let mut exti = Exti::new(peripherals.EXTI);
    let touch_int = exti
        .register_gpio(Port::I, 13, EdgeDetection::FallingEdge, &mut syscfg)
        .expect("touch data-ready line already in use");
    interrupt::free(|cs| {
        TOUCH_INT.borrow(cs).replace(Some(touch_int));
    });
    nvic.enable(Interrupt::EXTI15_10);

    let usb_bus = unsafe {
        USB_BUS = Some(UsbBusType::new(
            UsbFs::new(init::HCLK_HZ),
            &mut EP_MEMORY,
        ));
        USB_BUS.as_ref().unwrap()
    };
    let mut touch_hid = MultiTouchHid::new(usb_bus);
    let mut usb_dev = UsbDeviceBuilder::new(usb_bus, usb::VID_PID)
        .manufacturer(usb::MANUFACTURER)
        .product(usb::PRODUCT)
        .build();

    let mut digitizer = Digitizer::new();

    loop {
        usb_dev.poll(&mut [&mut touch_hid]);

        if usb_dev.state() != UsbDeviceState::Configured {
            // nothing can be published; keep the line armed so acquisition
            // starts as soon as the host configures us
            if TOUCH_READY.take() {
                rearm_touch_line();
            }
            continue;
        }

        // a cycle must not start while the previous report is still on its
        // way out
        if TOUCH_READY.is_pending() && !touch_hid.busy() {
            TOUCH_READY.take();
            // a bus error aborts the cycle; the next data-ready edge starts
            // a fresh one
            if let Ok(Publish::Sent) = digitizer.service(&mut i2c_3, &mut touch_hid) {
                pins.led.toggle();
            }
            rearm_touch_line();
        }
    }
}

fn rearm_touch_line() {
    interrupt::free(|cs| {
        if let Some(line) = TOUCH_INT.borrow(cs).borrow_mut().as_mut() {
            line.clear_pending();
            line.unmask();
        }
    });
}

interrupt!(EXTI15_10, touch_data_ready);

/// Top half: mask the source before any further edge can fire and hand the
/// event to the main loop.
fn touch_data_ready() {
    interrupt::free(|cs| {
        if let Some(line) = TOUCH_INT.borrow(cs).borrow_mut().as_mut() {
            line.mask();
            line.clear_pending();
        }
    });
    TOUCH_READY.set();
}

#[exception]
fn SysTick() {
    system_clock::tick();
}

#[exception]
fn HardFault(ef: &ExceptionFrame) -> ! {
    panic!("HardFault at {:#?}", ef);
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    interrupt::disable();

    if let Ok(mut hstdout) = hio::hstdout() {
        let _ = writeln!(hstdout, "{}", info);
    }

    // OK to fire a breakpoint here because we know the microcontroller is
    // connected to a debugger
    asm::bkpt();

    loop {}
}
