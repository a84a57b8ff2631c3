use core::cell::RefCell;

use crate::hal::{IrqSources, Usart};
use crate::ring::RingBuffer;
use crate::settings::LineSettings;
use crate::{ConsoleError, ConsoleResult};

/// A console shared between the foreground and the USART interrupt
/// handlers. Every access goes through `critical_section::with`.
pub type SharedConsole<U, const RX: usize, const TX: usize> =
    critical_section::Mutex<RefCell<Console<U, RX, TX>>>;

/// Step within the backspace, space, backspace sequence that rubs out
/// one character on the remote terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErasePhase {
    Backspace,
    Space,
    Restore,
}

/// Console state: both ring buffers, the line discipline bookkeeping and
/// the USART it drives.
///
/// The interrupt side lives in [`crate::discipline`]; this module holds
/// construction and the non-blocking foreground primitives that
/// [`crate::ConsoleStream`] loops over.
#[derive(Debug)]
pub struct Console<U, const RX: usize, const TX: usize> {
    pub(crate) usart: U,
    pub(crate) rx: RingBuffer<RX>,
    pub(crate) tx: RingBuffer<TX>,
    pub(crate) settings: LineSettings,
    /// Start of the open line in `rx`, always within `[get, put]`.
    pub(crate) current_line: usize,
    pub(crate) erase_count: usize,
    pub(crate) erase_phase: ErasePhase,
    pub(crate) onlcr_pending: bool,
    pub(crate) tx_idle: bool,
    pub(crate) line_overflow: bool,
}

impl<U: Usart, const RX: usize, const TX: usize> Console<U, RX, TX> {
    pub const fn new(usart: U, settings: LineSettings) -> Self {
        Self {
            usart,
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            settings,
            current_line: 0,
            erase_count: 0,
            erase_phase: ErasePhase::Backspace,
            onlcr_pending: false,
            tx_idle: true,
            line_overflow: false,
        }
    }

    /// Reset both buffers and the discipline state and arm the receiver.
    ///
    /// Interrupts must not reach the console before this has run.
    pub fn init(&mut self) {
        self.rx.clear();
        self.tx.clear();
        self.current_line = 0;
        self.erase_count = 0;
        self.erase_phase = ErasePhase::Backspace;
        self.onlcr_pending = false;
        self.tx_idle = true;
        self.line_overflow = false;

        self.usart
            .disable_irq(IrqSources::DATA_EMPTY | IrqSources::TX_COMPLETE);
        self.usart.enable_irq(IrqSources::RX_COMPLETE);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            rx_capacity = RX,
            tx_capacity = TX,
            flags = ?self.settings.flags,
            "console initialised"
        );
    }

    /// Queue one byte for transmission.
    pub fn try_write(&mut self, byte: u8) -> ConsoleResult<()> {
        self.tx.put(byte)?;
        self.arm_transmitter();
        Ok(())
    }

    /// Take one byte of input if the discipline lets the reader have it.
    pub fn try_read(&mut self) -> ConsoleResult<u8> {
        if !self.is_input_ready() {
            if !self.rx.is_full() {
                self.usart.enable_irq(IrqSources::RX_COMPLETE);
            }
            return Err(ConsoleError::WouldBlock);
        }

        let forced = self.is_line_forced();
        let (byte, _) = self.rx.get().map_err(|_| ConsoleError::WouldBlock)?;
        if forced {
            // the open line is being truncated at its head
            self.current_line = self.rx.get_index();
        }

        if !self.usart.irq_enabled().contains(IrqSources::RX_COMPLETE) {
            #[cfg(feature = "tracing")]
            tracing::trace!("receive buffer drained, receiver re-armed");
            self.usart.enable_irq(IrqSources::RX_COMPLETE);
        }
        Ok(byte)
    }

    /// Whether `try_read` would hand out a byte.
    ///
    /// In canonical mode only bytes of terminated lines are handed out,
    /// unless the buffer is full and nothing else can make progress.
    pub fn is_input_ready(&self) -> bool {
        if !self.rx.can_get() {
            return false;
        }
        !self.settings.is_canonical()
            || self.rx.get_index() != self.current_line
            || self.rx.is_full()
    }

    /// The buffer is full with one unterminated line, so reading has to
    /// eat into it.
    fn is_line_forced(&self) -> bool {
        self.settings.is_canonical()
            && self.rx.is_full()
            && self.rx.get_index() == self.current_line
            && self.rx.last() != Some(b'\n')
    }

    /// Whether the open line holds any byte that editing may remove.
    pub(crate) fn has_open_line(&self) -> bool {
        self.rx.put_index() != self.current_line
    }

    pub(crate) fn arm_transmitter(&mut self) {
        self.usart.disable_irq(IrqSources::TX_COMPLETE);
        self.usart.enable_irq(IrqSources::DATA_EMPTY);
        self.tx_idle = false;
    }

    /// Report and clear a discarded-input condition.
    pub fn take_line_overflow(&mut self) -> ConsoleResult<()> {
        if core::mem::take(&mut self.line_overflow) {
            Err(ConsoleError::LineTooLong)
        } else {
            Ok(())
        }
    }

    pub fn settings(&self) -> LineSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: LineSettings) {
        if !settings.is_canonical() {
            // everything queued so far counts as delivered input
            self.current_line = self.rx.put_index();
        }
        self.settings = settings;
    }

    /// The last byte has left the transmitter.
    pub fn is_transmit_idle(&self) -> bool {
        self.tx_idle
    }

    pub fn pending_erases(&self) -> usize {
        self.erase_count
    }

    pub fn current_line(&self) -> usize {
        self.current_line
    }

    pub fn rx(&self) -> &RingBuffer<RX> {
        &self.rx
    }

    pub fn tx(&self) -> &RingBuffer<TX> {
        &self.tx
    }

    pub fn usart(&self) -> &U {
        &self.usart
    }

    pub fn usart_mut(&mut self) -> &mut U {
        &mut self.usart
    }
}
