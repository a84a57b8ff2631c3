//! Hardware seams of the console.
//!
//! The console only needs a data register and three independently
//! maskable interrupt sources. Baud rate, frame format and pin setup are
//! left to the board bring-up code.

bitflags::bitflags! {
    /// USART interrupt sources, laid out like the enable bits of the
    /// AVR `UCSRnB` register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqSources: u8 {
        /// A received byte is waiting in the data register.
        const RX_COMPLETE = 1 << 7;
        /// The last byte has left the shift register.
        const TX_COMPLETE = 1 << 6;
        /// The transmit data register can take another byte.
        const DATA_EMPTY = 1 << 5;
    }
}

pub trait Usart {
    /// Read the received byte, acknowledging the receive interrupt.
    fn read_data(&mut self) -> u8;
    /// Hand a byte to the transmitter.
    fn write_data(&mut self, byte: u8);
    fn enable_irq(&mut self, sources: IrqSources);
    fn disable_irq(&mut self, sources: IrqSources);
    fn irq_enabled(&self) -> IrqSources;
}

/// What the foreground does while it waits for an interrupt to make
/// room or deliver data.
pub trait Idle {
    fn idle(&mut self);

    /// Idle once unless `ready` reports that the awaited condition already
    /// holds.
    ///
    /// A sleeping implementation must evaluate `ready` and enter its sleep
    /// with interrupts masked, so a handler that satisfies the condition in
    /// between leaves a pending interrupt behind to wake it.
    fn idle_unless(&mut self, ready: &mut dyn FnMut() -> bool) {
        if !ready() {
            self.idle();
        }
    }
}

/// Busy wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct Spin;

impl Idle for Spin {
    fn idle(&mut self) {
        core::hint::spin_loop();
    }
}

impl<T: Idle + ?Sized> Idle for &mut T {
    fn idle(&mut self) {
        (**self).idle();
    }

    fn idle_unless(&mut self, ready: &mut dyn FnMut() -> bool) {
        (**self).idle_unless(ready);
    }
}
