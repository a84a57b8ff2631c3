use std::fmt::{self, Write};

use ddsfw_core::{ConsoleStream, Idle, LineFlags, LineSettings, Usart};

pub const PROMPT: &str = "> ";

/// Options `stty` can show and toggle, named after their termios flags.
const OPTIONS: [(&str, LineFlags); 4] = [
    ("echo", LineFlags::ECHO),
    ("icanon", LineFlags::CANONICAL),
    ("icrnl", LineFlags::CR_TO_NL),
    ("onlcr", LineFlags::NL_TO_CR_NL),
];

/// Line-oriented command interpreter on top of the console.
#[derive(Debug, Default)]
pub struct Shell {
    commands: u64,
}

impl Shell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-empty lines executed so far.
    pub fn commands(&self) -> u64 {
        self.commands
    }

    pub fn prompt<U, I, const RX: usize, const TX: usize>(
        &self,
        stream: &mut ConsoleStream<'_, U, I, RX, TX>,
    ) -> fmt::Result
    where
        U: Usart,
        I: Idle,
    {
        stream.write_str(PROMPT)
    }

    /// Run one input line and print the next prompt.
    pub fn execute<U, I, const RX: usize, const TX: usize>(
        &mut self,
        line: &[u8],
        stream: &mut ConsoleStream<'_, U, I, RX, TX>,
    ) -> fmt::Result
    where
        U: Usart,
        I: Idle,
    {
        let line = String::from_utf8_lossy(line);
        let mut words = line.split_whitespace();

        if let Some(command) = words.next() {
            self.commands += 1;
            tracing::debug!(command, "shell command");
            match command {
                "help" => {
                    writeln!(stream, "commands: help, echo <text>, stty [[-]option ...]")?;
                }
                "echo" => {
                    let text: Vec<&str> = words.collect();
                    writeln!(stream, "{}", text.join(" "))?;
                }
                "stty" => stty(words, stream)?,
                other => writeln!(stream, "unknown command: {}", other)?,
            }
        }

        self.prompt(stream)
    }
}

fn stty<'w, U, I, const RX: usize, const TX: usize>(
    args: impl Iterator<Item = &'w str>,
    stream: &mut ConsoleStream<'_, U, I, RX, TX>,
) -> fmt::Result
where
    U: Usart,
    I: Idle,
{
    let mut changed = false;
    for arg in args {
        let (name, enable) = match arg.strip_prefix('-') {
            Some(name) => (name, false),
            None => (arg, true),
        };
        match OPTIONS.iter().find(|(option, _)| *option == name) {
            Some(&(_, flag)) => {
                stream.configure(|settings| settings.flags.set(flag, enable));
                changed = true;
            }
            None => return writeln!(stream, "stty: unknown option {}", arg),
        }
    }

    if !changed {
        let settings = stream.settings();
        writeln!(stream, "{}", describe(&settings))?;
    }
    Ok(())
}

/// `stty`-style summary, e.g. `echo icanon -icrnl onlcr erase=^? kill=^U`.
pub fn describe(settings: &LineSettings) -> String {
    let mut out = String::new();
    for (name, flag) in OPTIONS {
        if !settings.flags.contains(flag) {
            out.push('-');
        }
        out.push_str(name);
        out.push(' ');
    }
    out.push_str(&format!(
        "erase={} kill={}",
        caret(settings.erase),
        caret(settings.kill)
    ));
    out
}

fn caret(byte: u8) -> String {
    match byte {
        0x7f => "^?".to_string(),
        0x00..=0x1f => format!("^{}", (byte + 0x40) as char),
        _ => (byte as char).to_string(),
    }
}
