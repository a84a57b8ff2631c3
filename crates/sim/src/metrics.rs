use crate::SimulationObserver;
use ddsfw_core::IrqSources;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct ConsoleMetrics {
    step_count: AtomicU64,
    rx_interrupts: AtomicU64,
    data_empty_interrupts: AtomicU64,
    tx_complete_interrupts: AtomicU64,
    bytes_received: AtomicU64,
    bytes_transmitted: AtomicU64,
    overruns: AtomicU64,
    start_time: Instant,
}

impl Default for ConsoleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleMetrics {
    pub fn new() -> Self {
        Self {
            step_count: AtomicU64::new(0),
            rx_interrupts: AtomicU64::new(0),
            data_empty_interrupts: AtomicU64::new(0),
            tx_complete_interrupts: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_transmitted: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.step_count,
            &self.rx_interrupts,
            &self.data_empty_interrupts,
            &self.tx_complete_interrupts,
            &self.bytes_received,
            &self.bytes_transmitted,
            &self.overruns,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    pub fn get_steps(&self) -> u64 {
        self.step_count.load(Ordering::SeqCst)
    }

    /// Handler invocations for one interrupt source.
    pub fn get_interrupts(&self, source: IrqSources) -> u64 {
        let mut total = 0;
        if source.contains(IrqSources::RX_COMPLETE) {
            total += self.rx_interrupts.load(Ordering::SeqCst);
        }
        if source.contains(IrqSources::DATA_EMPTY) {
            total += self.data_empty_interrupts.load(Ordering::SeqCst);
        }
        if source.contains(IrqSources::TX_COMPLETE) {
            total += self.tx_complete_interrupts.load(Ordering::SeqCst);
        }
        total
    }

    pub fn get_bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::SeqCst)
    }

    pub fn get_bytes_transmitted(&self) -> u64 {
        self.bytes_transmitted.load(Ordering::SeqCst)
    }

    pub fn get_overruns(&self) -> u64 {
        self.overruns.load(Ordering::SeqCst)
    }

    pub fn get_steps_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.get_steps() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for ConsoleMetrics {
    fn on_step(&self) {
        self.step_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_interrupt(&self, source: IrqSources) {
        let counter = if source == IrqSources::RX_COMPLETE {
            &self.rx_interrupts
        } else if source == IrqSources::DATA_EMPTY {
            &self.data_empty_interrupts
        } else {
            &self.tx_complete_interrupts
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn on_byte_received(&self, _byte: u8) {
        self.bytes_received.fetch_add(1, Ordering::SeqCst);
    }

    fn on_byte_transmitted(&self, _byte: u8) {
        self.bytes_transmitted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::SeqCst);
    }
}
