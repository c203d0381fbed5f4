//! External interrupt lines.
//!
//! Only GPIO-sourced lines are supported. Registering a line configures the
//! SYSCFG port multiplexer and the edge trigger and unmasks the line; the
//! returned handle carries the mask/unmask/clear operations the acquisition
//! loop needs. The handle accesses the EXTI block through its raw pointer so
//! it stays usable from interrupt context.

use stm32f7::stm32f7x6::{EXTI, SYSCFG};

/// GPIO port index as understood by the SYSCFG external interrupt mux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
    G = 6,
    H = 7,
    I = 8,
    J = 9,
    K = 10,
}

pub enum EdgeDetection {
    RisingEdge,
    FallingEdge,
    BothEdges,
}

#[derive(Debug)]
pub struct LineAlreadyUsedError(pub u8);

pub struct Exti {
    exti: EXTI,
    lines_used: [bool; 16],
}

impl Exti {
    pub fn new(exti: EXTI) -> Exti {
        Exti {
            exti,
            lines_used: [false; 16],
        }
    }

    pub fn register_gpio(
        &mut self,
        port: Port,
        pin: u8,
        edge_detection: EdgeDetection,
        syscfg: &mut SYSCFG,
    ) -> Result<ExtiHandle, LineAlreadyUsedError> {
        assert!(pin < 16);
        if self.lines_used[pin as usize] {
            return Err(LineAlreadyUsedError(pin));
        }
        self.lines_used[pin as usize] = true;

        // route the port to the line (4 bits per line, 4 lines per register)
        let shift = u32::from(pin % 4) * 4;
        let value = (port as u32) << shift;
        let mask = !(0b1111 << shift);
        match pin / 4 {
            0 => syscfg
                .exticr1
                .modify(|r, w| unsafe { w.bits(r.bits() & mask | value) }),
            1 => syscfg
                .exticr2
                .modify(|r, w| unsafe { w.bits(r.bits() & mask | value) }),
            2 => syscfg
                .exticr3
                .modify(|r, w| unsafe { w.bits(r.bits() & mask | value) }),
            _ => syscfg
                .exticr4
                .modify(|r, w| unsafe { w.bits(r.bits() & mask | value) }),
        }

        let line = 1u32 << pin;
        let (rising, falling) = match edge_detection {
            EdgeDetection::RisingEdge => (true, false),
            EdgeDetection::FallingEdge => (false, true),
            EdgeDetection::BothEdges => (true, true),
        };
        self.exti.rtsr.modify(|r, w| unsafe {
            w.bits(if rising { r.bits() | line } else { r.bits() & !line })
        });
        self.exti.ftsr.modify(|r, w| unsafe {
            w.bits(if falling { r.bits() | line } else { r.bits() & !line })
        });

        let mut handle = ExtiHandle { line: pin };
        handle.clear_pending();
        handle.unmask();
        Ok(handle)
    }

    pub fn unregister(&mut self, mut handle: ExtiHandle) {
        handle.mask();
        self.lines_used[handle.line as usize] = false;
    }
}

/// Access to one registered line.
pub struct ExtiHandle {
    line: u8,
}

impl ExtiHandle {
    /// Mask the line so no further interrupts are delivered.
    pub fn mask(&mut self) {
        let exti = unsafe { &*EXTI::ptr() };
        exti.imr
            .modify(|r, w| unsafe { w.bits(r.bits() & !(1 << self.line)) });
    }

    /// Unmask the line.
    pub fn unmask(&mut self) {
        let exti = unsafe { &*EXTI::ptr() };
        exti.imr
            .modify(|r, w| unsafe { w.bits(r.bits() | 1 << self.line) });
    }

    /// Clear the line's pending flag (write-one-to-clear).
    pub fn clear_pending(&mut self) {
        let exti = unsafe { &*EXTI::ptr() };
        exti.pr.write(|w| unsafe { w.bits(1 << self.line) });
    }

    /// Whether the line's pending flag is set.
    pub fn is_pending(&self) -> bool {
        let exti = unsafe { &*EXTI::ptr() };
        exti.pr.read().bits() & (1 << self.line) != 0
    }
}
