use std::collections::VecDeque;

use ddsfw_core::{IrqSources, Usart};

use crate::{Peripheral, SimError, SimResult};

pub const UCSRA: u64 = 0x00;
pub const UCSRB: u64 = 0x01;
pub const UCSRC: u64 = 0x02;
pub const UBRRL: u64 = 0x04;
pub const UBRRH: u64 = 0x05;
pub const UDR: u64 = 0x06;

bitflags::bitflags! {
    /// Status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ucsra: u8 {
        const RXC = 1 << 7;
        const TXC = 1 << 6;
        const UDRE = 1 << 5;
        const FE = 1 << 4;
        const DOR = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Control register: interrupt enables and receiver/transmitter enables.
    /// The interrupt enable bits line up with [`IrqSources`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ucsrb: u8 {
        const RXCIE = 1 << 7;
        const TXCIE = 1 << 6;
        const UDRIE = 1 << 5;
        const RXEN = 1 << 4;
        const TXEN = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Frame format register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ucsrc: u8 {
        const USBS = 1 << 3;
        const UCSZ1 = 1 << 2;
        const UCSZ0 = 1 << 1;
    }
}

/// What happened on the wire during one bit time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireActivity {
    pub received: Option<u8>,
    pub transmitted: Option<u8>,
    pub overrun: bool,
}

/// AVR-style USART with a bit-time wire model.
///
/// The remote terminal sits on the other end of the wire: bytes fed with
/// [`SimUsart::feed`] arrive one frame apart, bytes shifted out land in
/// [`SimUsart::output`]. With `flow_control` on the terminal holds its
/// next byte while the receive latch is still unread; with it off a late
/// read loses data and sets `DOR`, like the real part.
#[derive(Debug)]
pub struct SimUsart {
    ucsra: Ucsra,
    ucsrb: Ucsrb,
    ucsrc: Ucsrc,
    ubrr: u16,
    rx_latch: Option<u8>,
    tx_buffer: Option<u8>,
    shifter: Option<(u8, u32)>,
    rx_countdown: u32,
    line_in: VecDeque<u8>,
    line_out: Vec<u8>,
    overruns: u64,
    dropped_writes: u64,
    flow_control: bool,
}

impl Default for SimUsart {
    fn default() -> Self {
        Self::new()
    }
}

impl SimUsart {
    pub fn new() -> Self {
        Self {
            ucsra: Ucsra::UDRE,
            ucsrb: Ucsrb::empty(),
            ucsrc: Ucsrc::UCSZ1 | Ucsrc::UCSZ0,
            ubrr: 0,
            rx_latch: None,
            tx_buffer: None,
            shifter: None,
            rx_countdown: 0,
            line_in: VecDeque::new(),
            line_out: Vec::new(),
            overruns: 0,
            dropped_writes: 0,
            flow_control: true,
        }
    }

    pub fn with_flow_control(mut self, enabled: bool) -> Self {
        self.flow_control = enabled;
        self
    }

    /// Queue bytes on the receive line.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.line_in.extend(bytes.iter().copied());
    }

    /// Everything shifted out so far.
    pub fn output(&self) -> &[u8] {
        &self.line_out
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.line_out)
    }

    pub fn pending_input(&self) -> usize {
        self.line_in.len()
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes
    }

    pub fn status(&self) -> Ucsra {
        self.ucsra
    }

    pub fn control(&self) -> Ucsrb {
        self.ucsrb
    }

    pub fn ubrr(&self) -> u16 {
        self.ubrr
    }

    /// Data bits per frame as set by `UCSZ`.
    pub fn data_bits(&self) -> u32 {
        let mut size = 0;
        if self.ucsrc.contains(Ucsrc::UCSZ0) {
            size |= 1;
        }
        if self.ucsrc.contains(Ucsrc::UCSZ1) {
            size |= 2;
        }
        5 + size
    }

    pub fn stop_bits(&self) -> u32 {
        if self.ucsrc.contains(Ucsrc::USBS) {
            2
        } else {
            1
        }
    }

    /// Bit times per frame, start bit included.
    pub fn frame_ticks(&self) -> u32 {
        1 + self.data_bits() + self.stop_bits()
    }

    /// Nothing left to send or receive on the wire.
    pub fn is_quiet(&self) -> bool {
        self.line_in.is_empty()
            && self.rx_latch.is_none()
            && self.tx_buffer.is_none()
            && self.shifter.is_none()
    }

    /// Enabled interrupt sources whose status flag is raised.
    pub fn pending(&self) -> IrqSources {
        let mut pending = IrqSources::empty();
        if self.ucsra.contains(Ucsra::RXC) && self.ucsrb.contains(Ucsrb::RXCIE) {
            pending |= IrqSources::RX_COMPLETE;
        }
        if self.ucsra.contains(Ucsra::UDRE) && self.ucsrb.contains(Ucsrb::UDRIE) {
            pending |= IrqSources::DATA_EMPTY;
        }
        if self.ucsra.contains(Ucsra::TXC) && self.ucsrb.contains(Ucsrb::TXCIE) {
            pending |= IrqSources::TX_COMPLETE;
        }
        pending
    }

    /// Entering the transmit-complete vector clears `TXC`.
    pub fn acknowledge(&mut self, sources: IrqSources) {
        if sources.contains(IrqSources::TX_COMPLETE) {
            self.ucsra.remove(Ucsra::TXC);
        }
    }

    /// Advance the wire by one bit time.
    pub fn advance(&mut self) -> WireActivity {
        let mut activity = WireActivity::default();

        if let Some((byte, remaining)) = self.shifter {
            if remaining > 1 {
                self.shifter = Some((byte, remaining - 1));
            } else {
                self.line_out.push(byte);
                activity.transmitted = Some(byte);
                self.shifter = None;
                self.start_shifter();
            }
        }

        if self.ucsrb.contains(Ucsrb::RXEN) && !self.line_in.is_empty() {
            let held = self.flow_control && self.rx_latch.is_some();
            if self.rx_countdown > 0 {
                self.rx_countdown -= 1;
            } else if !held {
                // a whole frame has arrived
                if let Some(byte) = self.line_in.pop_front() {
                    if self.rx_latch.is_some() {
                        self.ucsra.insert(Ucsra::DOR);
                        self.overruns += 1;
                        activity.overrun = true;
                        tracing::debug!(byte, "USART: receive overrun, byte lost");
                    } else {
                        self.rx_latch = Some(byte);
                        self.ucsra.insert(Ucsra::RXC);
                        activity.received = Some(byte);
                    }
                    self.rx_countdown = self.frame_ticks() - 1;
                }
            }
        }

        activity
    }

    fn start_shifter(&mut self) {
        if !self.ucsrb.contains(Ucsrb::TXEN) {
            return;
        }
        match self.tx_buffer.take() {
            Some(byte) => {
                self.shifter = Some((byte, self.frame_ticks()));
                self.ucsra.insert(Ucsra::UDRE);
            }
            None => self.ucsra.insert(Ucsra::TXC),
        }
    }

    fn take_received(&mut self) -> Option<u8> {
        self.ucsra.remove(Ucsra::RXC | Ucsra::DOR);
        self.rx_latch.take()
    }

    fn load_transmit(&mut self, byte: u8) -> bool {
        if !self.ucsra.contains(Ucsra::UDRE) {
            self.dropped_writes += 1;
            return false;
        }
        self.tx_buffer = Some(byte);
        self.ucsra.remove(Ucsra::UDRE | Ucsra::TXC);
        if self.shifter.is_none() {
            self.start_shifter();
        }
        true
    }
}

impl Peripheral for SimUsart {
    fn read(&self, offset: u64) -> SimResult<u8> {
        match offset {
            UCSRA => Ok(self.ucsra.bits()),
            UCSRB => Ok(self.ucsrb.bits()),
            UCSRC => Ok(self.ucsrc.bits()),
            UBRRL => Ok((self.ubrr & 0xFF) as u8),
            UBRRH => Ok((self.ubrr >> 8) as u8),
            // reading through the bus does not pop the latch
            UDR => Ok(self.rx_latch.unwrap_or(0)),
            _ => Err(SimError::RegisterViolation(offset)),
        }
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        match offset {
            UCSRA => {
                // TXC is cleared by writing a one to it
                if Ucsra::from_bits_truncate(value).contains(Ucsra::TXC) {
                    self.ucsra.remove(Ucsra::TXC);
                }
            }
            UCSRB => {
                self.ucsrb = Ucsrb::from_bits_truncate(value);
                tracing::debug!("USART: UCSRB set to {:#04x}", value);
            }
            UCSRC => {
                self.ucsrc = Ucsrc::from_bits_truncate(value);
                tracing::debug!(
                    "USART: frame {} data bits, {} stop bits",
                    self.data_bits(),
                    self.stop_bits()
                );
            }
            UBRRL => self.ubrr = (self.ubrr & 0x0F00) | value as u16,
            UBRRH => self.ubrr = (self.ubrr & 0x00FF) | (((value & 0x0F) as u16) << 8),
            UDR => {
                if !self.load_transmit(value) {
                    tracing::warn!("USART: UDR written while not empty, byte dropped");
                }
            }
            _ => return Err(SimError::RegisterViolation(offset)),
        }
        Ok(())
    }

    fn tick(&mut self) -> bool {
        self.advance();
        !self.pending().is_empty()
    }
}

impl Usart for SimUsart {
    fn read_data(&mut self) -> u8 {
        self.take_received().unwrap_or_else(|| {
            tracing::trace!("USART: UDR read with nothing received");
            0
        })
    }

    fn write_data(&mut self, byte: u8) {
        if !self.load_transmit(byte) {
            tracing::warn!(byte, "USART: UDR written while not empty, byte dropped");
        }
    }

    fn enable_irq(&mut self, sources: IrqSources) {
        self.ucsrb |= Ucsrb::from_bits_truncate(sources.bits());
    }

    fn disable_irq(&mut self, sources: IrqSources) {
        self.ucsrb -= Ucsrb::from_bits_truncate(sources.bits());
    }

    fn irq_enabled(&self) -> IrqSources {
        IrqSources::from_bits_truncate(self.ucsrb.bits())
    }
}
