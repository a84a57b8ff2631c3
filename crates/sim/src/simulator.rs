use std::cell::Cell;
use std::sync::Arc;

use ddsfw_core::{Idle, IrqSources, SharedConsole, Usart};

use crate::peripherals::usart::SimUsart;
use crate::{SimError, SimResult, SimulationObserver};

/// Vector priority of the USART interrupts, highest first.
const DISPATCH_ORDER: [IrqSources; 3] = [
    IrqSources::RX_COMPLETE,
    IrqSources::DATA_EMPTY,
    IrqSources::TX_COMPLETE,
];

/// Drives a console on a [`SimUsart`]: one step is one bit time on the
/// wire followed by every interrupt the USART raises.
///
/// All methods take `&self` so a `&Simulator` can serve as the idle
/// strategy of a [`ddsfw_core::ConsoleStream`] over the same console.
pub struct Simulator<'a, const RX: usize, const TX: usize> {
    console: &'a SharedConsole<SimUsart, RX, TX>,
    observers: Vec<Arc<dyn SimulationObserver>>,
    steps: Cell<u64>,
}

impl<'a, const RX: usize, const TX: usize> Simulator<'a, RX, TX> {
    pub fn new(console: &'a SharedConsole<SimUsart, RX, TX>) -> Self {
        Self {
            console,
            observers: Vec::new(),
            steps: Cell::new(0),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SimulationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn start(&self) {
        for observer in &self.observers {
            observer.on_simulation_start();
        }
    }

    pub fn stop(&self) {
        for observer in &self.observers {
            observer.on_simulation_stop();
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps.get()
    }

    pub fn step(&self) {
        self.steps.set(self.steps.get() + 1);

        let (activity, serviced) = critical_section::with(|cs| {
            let mut console = self.console.borrow_ref_mut(cs);
            let activity = console.usart_mut().advance();

            let mut serviced = IrqSources::empty();
            for source in DISPATCH_ORDER {
                if !console.usart().pending().contains(source) {
                    continue;
                }
                if source == IrqSources::RX_COMPLETE {
                    console.on_receive();
                } else if source == IrqSources::DATA_EMPTY {
                    console.on_data_register_empty();
                } else {
                    console.usart_mut().acknowledge(source);
                    console.on_transmit_complete();
                }
                serviced |= source;
            }
            (activity, serviced)
        });

        if !serviced.is_empty() {
            tracing::trace!(step = self.steps.get(), ?serviced, "interrupts dispatched");
        }

        for observer in &self.observers {
            observer.on_step();
            if let Some(byte) = activity.received {
                observer.on_byte_received(byte);
            }
            if let Some(byte) = activity.transmitted {
                observer.on_byte_transmitted(byte);
            }
            if activity.overrun {
                observer.on_overrun();
            }
            for source in serviced.iter() {
                observer.on_interrupt(source);
            }
        }
    }

    pub fn run(&self, steps: u64) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Step until the wire is quiet and the transmitter idle.
    pub fn run_until_settled(&self, max_steps: u64) -> SimResult<u64> {
        for taken in 0..max_steps {
            if self.is_settled() {
                return Ok(taken);
            }
            self.step();
        }
        if self.is_settled() {
            Ok(max_steps)
        } else {
            Err(SimError::Timeout(max_steps))
        }
    }

    pub fn is_settled(&self) -> bool {
        critical_section::with(|cs| {
            let console = self.console.borrow_ref(cs);
            console.usart().is_quiet() && console.is_transmit_idle()
        })
    }

    /// Queue bytes typed on the remote terminal.
    pub fn feed(&self, bytes: &[u8]) {
        critical_section::with(|cs| self.console.borrow_ref_mut(cs).usart_mut().feed(bytes));
    }

    pub fn output(&self) -> Vec<u8> {
        critical_section::with(|cs| self.console.borrow_ref(cs).usart().output().to_vec())
    }

    pub fn take_output(&self) -> Vec<u8> {
        critical_section::with(|cs| self.console.borrow_ref_mut(cs).usart_mut().take_output())
    }

    pub fn pending_input(&self) -> usize {
        critical_section::with(|cs| self.console.borrow_ref(cs).usart().pending_input())
    }

    pub fn irq_enabled(&self) -> IrqSources {
        critical_section::with(|cs| self.console.borrow_ref(cs).usart().irq_enabled())
    }
}

impl<const RX: usize, const TX: usize> Idle for &Simulator<'_, RX, TX> {
    fn idle(&mut self) {
        self.step();
    }
}
