//! USART1 of the STM32F103 driven through its raw registers.

use core::ptr::{read_volatile, write_volatile};

use ddsfw_core::{IrqSources, Usart};

const USART1_BASE: usize = 0x4001_3800;
const SR: usize = USART1_BASE;
const DR: usize = USART1_BASE + 0x04;
const BRR: usize = USART1_BASE + 0x08;
const CR1: usize = USART1_BASE + 0x0C;
const CR2: usize = USART1_BASE + 0x10;

const RCC_APB2ENR: usize = 0x4002_1018;
const RCC_APB2ENR_USART1EN: u32 = 1 << 14;

pub const SR_RXNE: u32 = 1 << 5;
pub const SR_TC: u32 = 1 << 6;
pub const SR_TXE: u32 = 1 << 7;

const CR1_RE: u32 = 1 << 2;
const CR1_TE: u32 = 1 << 3;
const CR1_RXNEIE: u32 = 1 << 5;
const CR1_TCIE: u32 = 1 << 6;
const CR1_TXEIE: u32 = 1 << 7;
const CR1_UE: u32 = 1 << 13;

const CR2_STOP_2: u32 = 0b10 << 12;

fn read(addr: usize) -> u32 {
    // SAFETY: addr is one of the USART1 or RCC registers above
    unsafe { read_volatile(addr as *const u32) }
}

fn write(addr: usize, value: u32) {
    // SAFETY: addr is one of the USART1 or RCC registers above
    unsafe { write_volatile(addr as *mut u32, value) }
}

fn modify(addr: usize, f: impl FnOnce(u32) -> u32) {
    write(addr, f(read(addr)));
}

fn cr1_bits(sources: IrqSources) -> u32 {
    let mut bits = 0;
    if sources.contains(IrqSources::RX_COMPLETE) {
        bits |= CR1_RXNEIE;
    }
    if sources.contains(IrqSources::TX_COMPLETE) {
        bits |= CR1_TCIE;
    }
    if sources.contains(IrqSources::DATA_EMPTY) {
        bits |= CR1_TXEIE;
    }
    bits
}

/// Handle to USART1. Zero-sized; the registers are the state.
#[derive(Debug)]
pub struct Usart1;

impl Usart1 {
    /// Clock the peripheral, program 8N2 at `baud` and enable both
    /// directions with all interrupts masked.
    ///
    /// Must run before the console is initialised.
    pub fn bring_up(pclk2: u32, baud: u32) {
        modify(RCC_APB2ENR, |v| v | RCC_APB2ENR_USART1EN);

        write(CR1, 0);
        write(BRR, (pclk2 + baud / 2) / baud);
        write(CR2, CR2_STOP_2);
        write(CR1, CR1_UE | CR1_TE | CR1_RE);
    }

    pub fn status() -> u32 {
        read(SR)
    }
}

impl Usart for Usart1 {
    fn read_data(&mut self) -> u8 {
        // SR was read by the dispatcher, so this also clears an overrun
        (read(DR) & 0xFF) as u8
    }

    fn write_data(&mut self, byte: u8) {
        write(DR, byte as u32);
    }

    fn enable_irq(&mut self, sources: IrqSources) {
        modify(CR1, |v| v | cr1_bits(sources));
    }

    fn disable_irq(&mut self, sources: IrqSources) {
        modify(CR1, |v| v & !cr1_bits(sources));
    }

    fn irq_enabled(&self) -> IrqSources {
        let cr1 = read(CR1);
        let mut sources = IrqSources::empty();
        if cr1 & CR1_RXNEIE != 0 {
            sources |= IrqSources::RX_COMPLETE;
        }
        if cr1 & CR1_TCIE != 0 {
            sources |= IrqSources::TX_COMPLETE;
        }
        if cr1 & CR1_TXEIE != 0 {
            sources |= IrqSources::DATA_EMPTY;
        }
        sources
    }
}
