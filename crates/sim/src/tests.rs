#[cfg(test)]
mod tests {
    use crate::metrics::ConsoleMetrics;
    use crate::peripherals::usart::{Ucsra, Ucsrb, UCSRA, UCSRB, UCSRC, UDR};
    use crate::{bring_up, FrameFormat, Peripheral, SimError, SimUsart, Simulator};
    use ddsfw_core::{
        Console, ConsoleError, ConsoleStream, IrqSources, LineFlags, LineSettings, SharedConsole,
        Usart,
    };
    use std::cell::RefCell;
    use std::sync::Arc;

    fn usart() -> SimUsart {
        let mut usart = SimUsart::new();
        bring_up(&mut usart, 3, FrameFormat::default()).unwrap();
        usart
    }

    fn shared<const RX: usize, const TX: usize>(
        settings: LineSettings,
    ) -> SharedConsole<SimUsart, RX, TX> {
        critical_section::Mutex::new(RefCell::new(Console::new(usart(), settings)))
    }

    fn init<const RX: usize, const TX: usize>(console: &SharedConsole<SimUsart, RX, TX>) {
        critical_section::with(|cs| console.borrow_ref_mut(cs).init());
    }

    /// Read whatever the console hands out, stepping the simulator while
    /// it has nothing, until the wire has settled.
    fn read_available<const RX: usize, const TX: usize>(
        console: &SharedConsole<SimUsart, RX, TX>,
        sim: &Simulator<'_, RX, TX>,
    ) -> Vec<u8> {
        let mut stream = ConsoleStream::new(console, sim);
        let mut out = Vec::new();
        for _ in 0..100_000 {
            match stream.read_byte() {
                Ok(byte) => out.push(byte),
                Err(ConsoleError::WouldBlock) if !sim.is_settled() => sim.step(),
                Err(_) => break,
            }
        }
        out
    }

    #[test]
    fn test_bring_up_programs_registers() {
        let usart = usart();
        assert_eq!(usart.ubrr(), 3);
        assert_eq!(usart.data_bits(), 8);
        assert_eq!(usart.stop_bits(), 2);
        assert_eq!(usart.frame_ticks(), 11);

        let ucsrb = Ucsrb::from_bits_truncate(usart.read(UCSRB).unwrap());
        assert_eq!(ucsrb, Ucsrb::RXEN | Ucsrb::TXEN | Ucsrb::RXCIE);
        assert_eq!(usart.read(UCSRC).unwrap(), 0b0000_1110);
        assert_eq!(usart.irq_enabled(), IrqSources::RX_COMPLETE);
    }

    #[test]
    fn test_bring_up_seven_bits_one_stop() {
        let mut usart = SimUsart::new();
        let frame = FrameFormat {
            data_bits: 7,
            stop_bits: 1,
        };
        bring_up(&mut usart, 0x1A0, frame).unwrap();
        assert_eq!(usart.ubrr(), 0x1A0);
        assert_eq!(usart.data_bits(), 7);
        assert_eq!(usart.frame_ticks(), 9);
    }

    #[test]
    fn test_bring_up_rejects_unsupported_frame() {
        let mut usart = SimUsart::new();
        let frame = FrameFormat {
            data_bits: 9,
            stop_bits: 1,
        };
        assert_eq!(
            bring_up(&mut usart, 3, frame),
            Err(SimError::UnsupportedFrame {
                data_bits: 9,
                stop_bits: 1
            })
        );
    }

    #[test]
    fn test_unmapped_register() {
        let mut usart = SimUsart::new();
        assert_eq!(usart.read(0x03), Err(SimError::RegisterViolation(0x03)));
        assert_eq!(usart.write(0x10, 0), Err(SimError::RegisterViolation(0x10)));
    }

    #[test]
    fn test_transmit_takes_one_frame() {
        let mut usart = usart();
        usart.write(UDR, b'a').unwrap();
        // moved straight into the shifter
        assert!(usart.status().contains(Ucsra::UDRE));

        for _ in 0..10 {
            usart.advance();
        }
        assert!(usart.output().is_empty());

        let activity = usart.advance();
        assert_eq!(activity.transmitted, Some(b'a'));
        assert_eq!(usart.output(), b"a");
        assert!(usart.status().contains(Ucsra::TXC));

        // write-one-to-clear
        usart.write(UCSRA, Ucsra::TXC.bits()).unwrap();
        assert!(!usart.status().contains(Ucsra::TXC));
    }

    #[test]
    fn test_write_to_full_data_register_is_dropped() {
        let mut usart = usart();
        usart.write_data(b'a');
        usart.write_data(b'b');
        assert!(!usart.status().contains(Ucsra::UDRE));
        usart.write_data(b'c');
        assert_eq!(usart.dropped_writes(), 1);

        for _ in 0..22 {
            usart.advance();
        }
        assert_eq!(usart.output(), b"ab");
    }

    #[test]
    fn test_receive_overrun_without_flow_control() {
        let mut usart = SimUsart::new().with_flow_control(false);
        bring_up(&mut usart, 3, FrameFormat::default()).unwrap();
        usart.feed(b"xy");

        assert_eq!(usart.advance().received, Some(b'x'));
        assert!(usart.status().contains(Ucsra::RXC));
        assert_eq!(usart.read(UDR).unwrap(), b'x');

        for _ in 0..10 {
            usart.advance();
        }
        assert!(usart.advance().overrun);
        assert_eq!(usart.overruns(), 1);
        assert!(usart.status().contains(Ucsra::DOR));

        assert_eq!(usart.read_data(), b'x');
        assert!(!usart.status().intersects(Ucsra::RXC | Ucsra::DOR));
    }

    #[test]
    fn test_flow_control_holds_input() {
        let mut usart = usart();
        usart.feed(b"xy");
        for _ in 0..40 {
            usart.advance();
        }
        assert_eq!(usart.overruns(), 0);
        assert_eq!(usart.pending_input(), 1);

        assert_eq!(usart.read_data(), b'x');
        assert_eq!(usart.advance().received, Some(b'y'));
    }

    #[test]
    fn test_tick_reports_pending_interrupt() {
        let mut usart = usart();
        assert!(!usart.tick());
        usart.feed(b"a");
        assert!(usart.tick());
        assert_eq!(usart.pending(), IrqSources::RX_COMPLETE);

        usart.disable_irq(IrqSources::RX_COMPLETE);
        assert!(usart.pending().is_empty());
    }

    #[test]
    fn test_line_echo_end_to_end() {
        let console = shared::<32, 32>(LineSettings::DEFAULT);
        init(&console);
        let sim = Simulator::new(&console);

        sim.feed(b"hello\r");
        sim.run_until_settled(10_000).unwrap();
        assert_eq!(sim.output(), b"hello\r\n");
        assert_eq!(read_available(&console, &sim), b"hello\n");
    }

    #[test]
    fn test_erase_end_to_end() {
        let console = shared::<32, 32>(LineSettings::DEFAULT);
        init(&console);
        let sim = Simulator::new(&console);

        sim.feed(b"ab\x7fc\r");
        sim.run_until_settled(10_000).unwrap();
        assert_eq!(sim.output(), b"ab\x08 \x08c\r\n");
        assert_eq!(read_available(&console, &sim), b"ac\n");
    }

    #[test]
    fn test_kill_end_to_end() {
        let console = shared::<32, 32>(LineSettings::DEFAULT);
        init(&console);
        let sim = Simulator::new(&console);

        sim.feed(b"no\x15ok\r");
        sim.run_until_settled(10_000).unwrap();
        assert_eq!(sim.output(), b"no\x08 \x08\x08 \x08ok\r\n");
        assert_eq!(read_available(&console, &sim), b"ok\n");
    }

    #[test]
    fn test_backpressure_end_to_end() {
        let settings = LineSettings::with_flags(LineFlags::NONBLOCKING_READ);
        let console = shared::<4, 4>(settings);
        init(&console);
        let sim = Simulator::new(&console);

        sim.feed(b"abcdefgh");
        assert_eq!(sim.run_until_settled(500), Err(SimError::Timeout(500)));
        assert!(!sim.irq_enabled().contains(IrqSources::RX_COMPLETE));
        // one byte sits in the receive latch, the rest is held off
        assert_eq!(sim.pending_input(), 3);

        assert_eq!(read_available(&console, &sim), b"abcdefgh");
        critical_section::with(|cs| {
            assert_eq!(console.borrow_ref(cs).usart().overruns(), 0);
        });
    }

    #[test]
    fn test_stream_output_through_simulator() {
        let console = shared::<32, 32>(LineSettings::DEFAULT);
        let sim = Simulator::new(&console);
        let mut stream = ConsoleStream::new(&console, &sim);
        stream.init();

        let message = "the quick brown fox jumps over the lazy dog\n".repeat(3);
        stream.write_bytes(message.as_bytes());
        stream.flush();

        let expected = message.replace('\n', "\r\n");
        assert_eq!(sim.output(), expected.as_bytes());
        assert!(sim.is_settled());
    }

    #[test]
    fn test_metrics_observer() {
        let console = shared::<32, 32>(LineSettings::DEFAULT);
        init(&console);
        let metrics = Arc::new(ConsoleMetrics::new());
        let sim = Simulator::new(&console).with_observer(metrics.clone());

        sim.start();
        sim.feed(b"hi\r");
        let steps = sim.run_until_settled(10_000).unwrap();
        sim.stop();

        assert_eq!(metrics.get_steps(), steps);
        assert_eq!(metrics.get_bytes_received(), 3);
        assert_eq!(metrics.get_bytes_transmitted(), 4);
        assert_eq!(metrics.get_interrupts(IrqSources::RX_COMPLETE), 3);
        assert!(metrics.get_interrupts(IrqSources::DATA_EMPTY) >= 4);
        assert!(metrics.get_interrupts(IrqSources::TX_COMPLETE) >= 1);
        assert_eq!(metrics.get_overruns(), 0);

        metrics.reset();
        assert_eq!(metrics.get_steps(), 0);
    }
}
