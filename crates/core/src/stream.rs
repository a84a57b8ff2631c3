//! Foreground byte-stream API.
//!
//! Interrupts are masked only around the buffer operation itself; the
//! waiting happens outside the critical section so the handlers can run.
//! Before each wait the condition is checked again through
//! [`Idle::idle_unless`], which a sleeping idle runs with interrupts masked.

use core::fmt;

use crate::console::SharedConsole;
use crate::hal::{Idle, Usart};
use crate::settings::{LineFlags, LineSettings};
use crate::{ConsoleError, ConsoleResult};

pub struct ConsoleStream<'a, U, I, const RX: usize, const TX: usize> {
    console: &'a SharedConsole<U, RX, TX>,
    idle: I,
}

impl<'a, U, I, const RX: usize, const TX: usize> ConsoleStream<'a, U, I, RX, TX>
where
    U: Usart,
    I: Idle,
{
    pub fn new(console: &'a SharedConsole<U, RX, TX>, idle: I) -> Self {
        Self { console, idle }
    }

    /// Bind the buffers, reset the discipline and arm the receiver.
    pub fn init(&mut self) {
        critical_section::with(|cs| self.console.borrow_ref_mut(cs).init());
    }

    pub fn write_byte(&mut self, byte: u8) {
        loop {
            let queued =
                critical_section::with(|cs| self.console.borrow_ref_mut(cs).try_write(byte));
            if queued.is_ok() {
                return;
            }
            let console = self.console;
            self.idle.idle_unless(&mut || {
                critical_section::with(|cs| !console.borrow_ref(cs).tx().is_full())
            });
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }

    /// Read one byte of input.
    ///
    /// With [`LineFlags::NONBLOCKING_READ`] set this returns
    /// [`ConsoleError::WouldBlock`] instead of waiting.
    pub fn read_byte(&mut self) -> ConsoleResult<u8> {
        loop {
            let (read, nonblocking) = critical_section::with(|cs| {
                let mut console = self.console.borrow_ref_mut(cs);
                let nonblocking = console
                    .settings()
                    .flags
                    .contains(LineFlags::NONBLOCKING_READ);
                (console.try_read(), nonblocking)
            });

            match read {
                Ok(byte) => return Ok(byte),
                Err(err) if nonblocking => return Err(err),
                Err(_) => self.wait_for_input(),
            }
        }
    }

    /// Read up to and including the next NL, or until `buf` is full.
    ///
    /// In non-blocking mode `WouldBlock` is returned only when nothing has
    /// been read yet; a partially read line is waited out.
    pub fn read_line(&mut self, buf: &mut [u8]) -> ConsoleResult<usize> {
        let mut len = 0;
        while len < buf.len() {
            match self.read_byte() {
                Ok(byte) => {
                    buf[len] = byte;
                    len += 1;
                    if byte == b'\n' {
                        break;
                    }
                }
                Err(ConsoleError::WouldBlock) if len > 0 => self.wait_for_input(),
                Err(err) => return Err(err),
            }
        }
        Ok(len)
    }

    /// Wait until every queued byte has left the transmitter.
    pub fn flush(&mut self) {
        let console = self.console;
        let mut drained =
            || critical_section::with(|cs| console.borrow_ref(cs).is_transmit_idle());
        while !drained() {
            self.idle.idle_unless(&mut drained);
        }
    }

    fn wait_for_input(&mut self) {
        let console = self.console;
        self.idle.idle_unless(&mut || {
            critical_section::with(|cs| console.borrow_ref(cs).is_input_ready())
        });
    }

    pub fn settings(&self) -> LineSettings {
        critical_section::with(|cs| self.console.borrow_ref(cs).settings())
    }

    pub fn configure<F>(&mut self, f: F)
    where
        F: FnOnce(&mut LineSettings),
    {
        critical_section::with(|cs| {
            let mut console = self.console.borrow_ref_mut(cs);
            let mut settings = console.settings();
            f(&mut settings);
            console.set_settings(settings);
        });
    }

    /// Report and clear bytes discarded because a line did not fit.
    pub fn take_line_overflow(&mut self) -> ConsoleResult<()> {
        critical_section::with(|cs| self.console.borrow_ref_mut(cs).take_line_overflow())
    }

    pub fn idle_mut(&mut self) -> &mut I {
        &mut self.idle
    }
}

impl<U, I, const RX: usize, const TX: usize> fmt::Write for ConsoleStream<'_, U, I, RX, TX>
where
    U: Usart,
    I: Idle,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}
