//! Line discipline options.

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineFlags: u8 {
        /// Mirror received bytes back to the transmitter.
        const ECHO = 1 << 0;
        /// Line-buffered input with erase and kill editing.
        const CANONICAL = 1 << 1;
        /// Translate a received CR to NL.
        const CR_TO_NL = 1 << 2;
        /// Expand a transmitted NL to CR NL.
        const NL_TO_CR_NL = 1 << 3;
        /// Reads return `WouldBlock` instead of waiting.
        const NONBLOCKING_READ = 1 << 4;
    }
}

/// DEL, sent by the backspace key of most terminals.
pub const ERASE_DEFAULT: u8 = 0x7f;
/// Ctrl+U
pub const KILL_DEFAULT: u8 = 0x15;

pub const BACKSPACE: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub flags: LineFlags,
    pub erase: u8,
    pub kill: u8,
}

impl LineSettings {
    pub const DEFAULT: LineSettings = LineSettings {
        flags: LineFlags::ECHO
            .union(LineFlags::CANONICAL)
            .union(LineFlags::CR_TO_NL)
            .union(LineFlags::NL_TO_CR_NL)
            .union(LineFlags::NONBLOCKING_READ),
        erase: ERASE_DEFAULT,
        kill: KILL_DEFAULT,
    };

    /// No translation, no echo, no editing, blocking reads.
    pub const RAW: LineSettings = LineSettings {
        flags: LineFlags::empty(),
        erase: ERASE_DEFAULT,
        kill: KILL_DEFAULT,
    };

    pub const fn with_flags(flags: LineFlags) -> Self {
        LineSettings {
            flags,
            erase: ERASE_DEFAULT,
            kill: KILL_DEFAULT,
        }
    }

    pub fn is_canonical(&self) -> bool {
        self.flags.contains(LineFlags::CANONICAL)
    }

    pub fn is_echo(&self) -> bool {
        self.flags.contains(LineFlags::ECHO)
    }
}

impl Default for LineSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}
