use crate::peripherals::usart::{Ucsrb, Ucsrc, UBRRH, UBRRL, UCSRA, UCSRB, UCSRC};
use crate::{Peripheral, SimError, SimResult};

/// Serial frame layout, start bit excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub data_bits: u8,
    pub stop_bits: u8,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            data_bits: 8,
            stop_bits: 2,
        }
    }
}

impl FrameFormat {
    fn ucsrc(&self) -> SimResult<Ucsrc> {
        let size = match self.data_bits {
            5..=8 => self.data_bits - 5,
            _ => return Err(self.unsupported()),
        };
        let mut bits = Ucsrc::empty();
        match self.stop_bits {
            1 => {}
            2 => bits |= Ucsrc::USBS,
            _ => return Err(self.unsupported()),
        }
        if size & 1 != 0 {
            bits |= Ucsrc::UCSZ0;
        }
        if size & 2 != 0 {
            bits |= Ucsrc::UCSZ1;
        }
        Ok(bits)
    }

    fn unsupported(&self) -> SimError {
        SimError::UnsupportedFrame {
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
        }
    }
}

/// Program baud divisor and frame format, then enable the receiver, the
/// transmitter and the receive interrupt.
///
/// Must run before the console is initialised.
pub fn bring_up<P: Peripheral + ?Sized>(
    usart: &mut P,
    ubrr: u16,
    frame: FrameFormat,
) -> SimResult<()> {
    let ucsrc = frame.ucsrc()?;

    usart.write(UBRRH, (ubrr >> 8) as u8)?;
    usart.write(UBRRL, (ubrr & 0xFF) as u8)?;
    usart.write(
        UCSRB,
        (Ucsrb::RXEN | Ucsrb::TXEN | Ucsrb::RXCIE).bits(),
    )?;
    usart.write(UCSRA, 0)?;
    usart.write(UCSRC, ucsrc.bits())?;

    tracing::debug!(
        ubrr,
        data_bits = frame.data_bits,
        stop_bits = frame.stop_bits,
        "USART brought up"
    );
    Ok(())
}
