#![no_main]
#![no_std]

use core::cell::RefCell;
use core::fmt::Write;

use cortex_m::peripheral::NVIC;
use cortex_m_rt::entry;
use critical_section::Mutex;
use ddsfw_core::{
    Console, ConsoleStream, Idle, IrqSources, LineFlags, LineSettings, SharedConsole,
};
use panic_halt as _;
use stm32f1xx_hal::pac::{self, interrupt};
use stm32f1xx_hal::prelude::*;

mod usart;

use usart::{Usart1, SR_RXNE, SR_TC, SR_TXE};

const RX_CAPACITY: usize = 32;
const TX_CAPACITY: usize = 32;
const BAUD: u32 = 115_200;

/// Blocking reads: the foreground sleeps until an interrupt delivers.
const SETTINGS: LineSettings = LineSettings::with_flags(
    LineFlags::ECHO
        .union(LineFlags::CANONICAL)
        .union(LineFlags::CR_TO_NL)
        .union(LineFlags::NL_TO_CR_NL),
);

static CONSOLE: SharedConsole<Usart1, RX_CAPACITY, TX_CAPACITY> =
    Mutex::new(RefCell::new(Console::new(Usart1, SETTINGS)));

/// Sleep until the next interrupt.
struct Wfi;

impl Idle for Wfi {
    fn idle(&mut self) {
        cortex_m::asm::wfi();
    }

    fn idle_unless(&mut self, ready: &mut dyn FnMut() -> bool) {
        // a pending interrupt still ends WFI while PRIMASK is set
        cortex_m::interrupt::disable();
        if !ready() {
            cortex_m::asm::wfi();
        }
        // SAFETY: the foreground only waits with interrupts enabled
        unsafe { cortex_m::interrupt::enable() };
    }
}

#[interrupt]
fn USART1() {
    critical_section::with(|cs| {
        let mut console = CONSOLE.borrow_ref_mut(cs);
        let status = Usart1::status();
        let enabled = console.usart().irq_enabled();

        if status & SR_RXNE != 0 && enabled.contains(IrqSources::RX_COMPLETE) {
            console.on_receive();
        }
        if status & SR_TXE != 0 && enabled.contains(IrqSources::DATA_EMPTY) {
            console.on_data_register_empty();
        }
        if status & SR_TC != 0 && enabled.contains(IrqSources::TX_COMPLETE) {
            console.on_transmit_complete();
        }
    });
}

type Stream = ConsoleStream<'static, Usart1, Wfi, RX_CAPACITY, TX_CAPACITY>;

fn execute(line: &[u8], stream: &mut Stream) -> core::fmt::Result {
    let Ok(line) = core::str::from_utf8(line) else {
        return writeln!(stream, "?");
    };
    let mut words = line.split_whitespace();

    match words.next() {
        None => {}
        Some("help") => writeln!(stream, "commands: help, echo <text>, stty [-]echo")?,
        Some("echo") => {
            for (i, word) in words.enumerate() {
                if i > 0 {
                    stream.write_char(' ')?;
                }
                stream.write_str(word)?;
            }
            stream.write_char('\n')?;
        }
        Some("stty") => match words.next() {
            Some("echo") => stream.configure(|s| s.flags.insert(LineFlags::ECHO)),
            Some("-echo") => stream.configure(|s| s.flags.remove(LineFlags::ECHO)),
            _ => {
                let state = if stream.settings().is_echo() { "on" } else { "off" };
                writeln!(stream, "echo is {}", state)?;
            }
        },
        Some(other) => writeln!(stream, "unknown command: {}", other)?,
    }
    Ok(())
}

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();

    let mut flash = dp.FLASH.constrain();
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.freeze(&mut flash.acr);

    // PA9 TX, PA10 RX (floating input after reset)
    let mut gpioa = dp.GPIOA.split();
    let _tx = gpioa.pa9.into_alternate_push_pull(&mut gpioa.crh);

    Usart1::bring_up(clocks.pclk2().raw(), BAUD);

    let mut stream: Stream = ConsoleStream::new(&CONSOLE, Wfi);
    stream.init();
    // SAFETY: the console is initialised and nothing else masks this line
    unsafe { NVIC::unmask(pac::Interrupt::USART1) };

    let _ = writeln!(stream, "ddsfw console");

    let mut line = [0u8; RX_CAPACITY];
    loop {
        stream.write_bytes(b"> ");
        if let Ok(len) = stream.read_line(&mut line) {
            let _ = execute(&line[..len], &mut stream);
        }
        if stream.take_line_overflow().is_err() {
            let _ = writeln!(stream, "line too long");
        }
    }
}
