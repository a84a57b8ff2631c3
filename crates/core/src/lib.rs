//! Interrupt-driven serial console for the ddsfw controller.
//!
//! The console is split the way the hardware splits it: the receive and
//! transmit interrupt handlers run the line discipline on two ring
//! buffers, and the foreground talks to them through [`ConsoleStream`].
//! Both sides share one [`Console`] behind a critical-section mutex.
#![cfg_attr(not(test), no_std)]

pub mod console;
pub mod discipline;
pub mod hal;
pub mod ring;
pub mod settings;
pub mod stream;


pub use console::{Console, SharedConsole};
pub use hal::{Idle, IrqSources, Spin, Usart};
pub use ring::{Drain, Fill, RingBuffer};
pub use settings::{LineFlags, LineSettings};
pub use stream::ConsoleStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("buffer full")]
    BufferFull,
    #[error("buffer empty")]
    BufferEmpty,
    #[error("input line too long, bytes were discarded")]
    LineTooLong,
    #[error("operation would block")]
    WouldBlock,
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;
