pub mod bringup;
pub mod metrics;
pub mod peripherals;
pub mod simulator;

pub use bringup::{bring_up, FrameFormat};
pub use peripherals::usart::SimUsart;
pub use simulator::Simulator;

use ddsfw_core::IrqSources;

mod tests;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SimError {
    #[error("Register access violation at offset {0:#x}")]
    RegisterViolation(u64),
    #[error("Unsupported frame format: {data_bits} data bits, {stop_bits} stop bits")]
    UnsupportedFrame { data_bits: u8, stop_bits: u8 },
    #[error("Console did not settle within {0} steps")]
    Timeout(u64),
}

pub type SimResult<T> = Result<T, SimError>;

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    fn on_simulation_stop(&self) {}
    fn on_step(&self) {}
    fn on_interrupt(&self, _source: IrqSources) {}
    fn on_byte_received(&self, _byte: u8) {}
    fn on_byte_transmitted(&self, _byte: u8) {}
    fn on_overrun(&self) {}
}

/// Trait representing a register-mapped peripheral
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;
    /// Advance one bit time. Returns whether an interrupt is pending.
    fn tick(&mut self) -> bool {
        false
    }
}
