//! Interrupt-side line discipline.
//!
//! Each handler runs to completion inside the caller's critical section
//! and touches the hardware only through [`Usart`].

use crate::console::{Console, ErasePhase};
use crate::hal::{IrqSources, Usart};
use crate::ring::Fill;
use crate::settings::{LineFlags, BACKSPACE};

impl<U: Usart, const RX: usize, const TX: usize> Console<U, RX, TX> {
    /// Receive complete: one byte is waiting in the data register.
    pub fn on_receive(&mut self) {
        let mut byte = self.usart.read_data();
        let flags = self.settings.flags;

        if flags.contains(LineFlags::CR_TO_NL) && byte == b'\r' {
            byte = b'\n';
        }

        let canonical = flags.contains(LineFlags::CANONICAL);
        if canonical && self.has_open_line() {
            if byte == self.settings.erase {
                self.erase_one();
                return;
            }
            if byte == self.settings.kill {
                while self.has_open_line() && self.erase_one() {}
                return;
            }
        }

        let echo = flags.contains(LineFlags::ECHO);
        let queued = if echo {
            self.rx.put_echo(byte)
        } else {
            self.rx.put(byte)
        };

        match queued {
            Ok(Fill::NowFull) if canonical && byte != b'\n' => {
                // keep the last slot for the line terminator
                let retracted = self.rx.unput();
                debug_assert!(retracted.is_ok(), "a byte was just queued");
                self.line_overflow = true;
                #[cfg(feature = "tracing")]
                tracing::debug!(byte, "input line too long, byte discarded");
            }
            Ok(_) => {
                if echo {
                    self.arm_transmitter();
                }
                if byte == b'\n' || !canonical {
                    self.current_line = self.rx.put_index();
                }
            }
            Err(_) if canonical => self.line_overflow = true,
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(byte, "receive buffer full, byte dropped");
            }
        }

        if self.rx.is_full() {
            #[cfg(feature = "tracing")]
            tracing::trace!("receive buffer full, receiver masked");
            self.usart.disable_irq(IrqSources::RX_COMPLETE);
        }
    }

    /// Data register empty: the transmitter can take one more byte.
    pub fn on_data_register_empty(&mut self) {
        if let Some(byte) = self.next_output() {
            self.usart.write_data(byte);
        }

        if self.is_output_drained() {
            self.usart.disable_irq(IrqSources::DATA_EMPTY);
            self.usart.enable_irq(IrqSources::TX_COMPLETE);
        }
    }

    /// Transmit complete: the shift register has emptied.
    pub fn on_transmit_complete(&mut self) {
        self.usart.disable_irq(IrqSources::TX_COMPLETE);
        self.tx_idle = true;
    }

    /// Retract the newest byte of the open line, scheduling a rub-out on
    /// the terminal if the byte had already been echoed.
    fn erase_one(&mut self) -> bool {
        let visible = self.settings.is_echo() && !self.rx.is_echo_pending();
        if self.rx.unput().is_err() {
            return false;
        }
        if visible {
            self.erase_count += 1;
            self.arm_transmitter();
        }
        true
    }

    fn next_output(&mut self) -> Option<u8> {
        if self.onlcr_pending {
            self.onlcr_pending = false;
            return Some(b'\n');
        }

        if self.erase_count > 0 {
            return Some(self.erase_step());
        }

        let byte = match self.rx.echo() {
            Ok((byte, _)) => byte,
            Err(_) => self.tx.get().ok()?.0,
        };

        if byte == b'\n' && self.settings.flags.contains(LineFlags::NL_TO_CR_NL) {
            self.onlcr_pending = true;
            return Some(b'\r');
        }
        Some(byte)
    }

    fn erase_step(&mut self) -> u8 {
        match self.erase_phase {
            ErasePhase::Backspace => {
                self.erase_phase = ErasePhase::Space;
                BACKSPACE
            }
            ErasePhase::Space => {
                self.erase_phase = ErasePhase::Restore;
                b' '
            }
            ErasePhase::Restore => {
                self.erase_phase = ErasePhase::Backspace;
                self.erase_count -= 1;
                BACKSPACE
            }
        }
    }

    fn is_output_drained(&self) -> bool {
        !self.onlcr_pending
            && self.erase_count == 0
            && !self.rx.is_echo_pending()
            && !self.tx.can_get()
    }
}
