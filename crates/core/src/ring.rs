use crate::{ConsoleError, ConsoleResult};

bitflags::bitflags! {
    /// Availability flags for the three cursors.
    ///
    /// When all cursors sit on the same slot the buffer may be completely
    /// empty or completely full, so these flags are the only record of
    /// either state. They are updated together with the cursor they
    /// describe and never derived from cursor positions afterwards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RingState: u8 {
        /// No free slot for `put`.
        const CANT_PUT = 0x01;
        /// No echoed byte waiting for `get`.
        const CANT_GET = 0x02;
        /// No byte waiting for `echo`.
        const CANT_ECHO = 0x04;
    }
}

/// Result of a successful `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    SpaceRemains,
    NowFull,
}

/// Result of a successful `get`, `echo` or `unput`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    MoreRemains,
    NowEmpty,
}

/// Fixed capacity byte ring with put, get and echo cursors.
///
/// The cursors keep the circular order `get <= echo <= put`. Bytes in
/// `[echo, put)` are waiting to be echoed, bytes in `[get, echo)` have
/// been echoed and can be read. A buffer that is only ever fed with
/// [`RingBuffer::put`] keeps the echo cursor glued to `put` and behaves
/// like a plain FIFO.
#[derive(Debug, Clone)]
pub struct RingBuffer<const N: usize> {
    data: [u8; N],
    put: usize,
    get: usize,
    echo: usize,
    state: RingState,
}

impl<const N: usize> RingBuffer<N> {
    const NON_ZERO: () = assert!(N > 0, "ring buffer capacity must be non-zero");

    pub const fn new() -> Self {
        let () = Self::NON_ZERO;
        Self {
            data: [0; N],
            put: 0,
            get: 0,
            echo: 0,
            state: RingState::CANT_GET.union(RingState::CANT_ECHO),
        }
    }

    /// Drop all content and return the cursors to the first slot.
    pub fn clear(&mut self) {
        self.put = 0;
        self.get = 0;
        self.echo = 0;
        self.state = RingState::CANT_GET | RingState::CANT_ECHO;
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes held, echoed or not.
    pub fn len(&self) -> usize {
        if self.is_full() {
            N
        } else if self.is_empty() {
            0
        } else {
            (self.put + N - self.get) % N
        }
    }

    pub fn is_full(&self) -> bool {
        self.state.contains(RingState::CANT_PUT)
    }

    pub fn is_empty(&self) -> bool {
        self.state.contains(RingState::CANT_GET | RingState::CANT_ECHO)
    }

    pub fn can_get(&self) -> bool {
        !self.state.contains(RingState::CANT_GET)
    }

    pub fn is_echo_pending(&self) -> bool {
        !self.state.contains(RingState::CANT_ECHO)
    }

    pub fn state(&self) -> RingState {
        self.state
    }

    pub fn put_index(&self) -> usize {
        self.put
    }

    pub fn get_index(&self) -> usize {
        self.get
    }

    pub fn echo_index(&self) -> usize {
        self.echo
    }

    /// The most recently queued byte, if any.
    pub fn last(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.data[Self::retreat(self.put)])
        }
    }

    /// Queue a byte that bypasses the echo path.
    ///
    /// Anything still waiting for echo becomes readable with it.
    pub fn put(&mut self, byte: u8) -> ConsoleResult<Fill> {
        if self.is_full() {
            return Err(ConsoleError::BufferFull);
        }
        self.data[self.put] = byte;
        self.put = Self::advance(self.put);
        self.echo = self.put;
        self.state.remove(RingState::CANT_GET);
        self.state.insert(RingState::CANT_ECHO);
        Ok(self.fill_after_put())
    }

    /// Queue a byte that must be echoed before it can be read.
    pub fn put_echo(&mut self, byte: u8) -> ConsoleResult<Fill> {
        if self.is_full() {
            return Err(ConsoleError::BufferFull);
        }
        self.data[self.put] = byte;
        self.put = Self::advance(self.put);
        self.state.remove(RingState::CANT_ECHO);
        Ok(self.fill_after_put())
    }

    pub fn get(&mut self) -> ConsoleResult<(u8, Drain)> {
        if !self.can_get() {
            return Err(ConsoleError::BufferEmpty);
        }
        let byte = self.data[self.get];
        self.get = Self::advance(self.get);
        self.state.remove(RingState::CANT_PUT);
        if self.get == self.echo {
            self.state.insert(RingState::CANT_GET);
            Ok((byte, Drain::NowEmpty))
        } else {
            Ok((byte, Drain::MoreRemains))
        }
    }

    pub fn echo(&mut self) -> ConsoleResult<(u8, Drain)> {
        if !self.is_echo_pending() {
            return Err(ConsoleError::BufferEmpty);
        }
        let byte = self.data[self.echo];
        self.echo = Self::advance(self.echo);
        self.state.remove(RingState::CANT_GET);
        if self.echo == self.put {
            self.state.insert(RingState::CANT_ECHO);
            Ok((byte, Drain::NowEmpty))
        } else {
            Ok((byte, Drain::MoreRemains))
        }
    }

    /// Take back the most recently queued byte.
    pub fn unput(&mut self) -> ConsoleResult<(u8, Drain)> {
        if self.is_empty() {
            return Err(ConsoleError::BufferEmpty);
        }
        let echo_disabled = !self.is_echo_pending();
        self.put = Self::retreat(self.put);
        let byte = self.data[self.put];
        self.state.remove(RingState::CANT_PUT);

        if echo_disabled {
            // the byte sat in the readable window
            self.echo = self.put;
            if self.get == self.put {
                self.state.insert(RingState::CANT_GET);
            }
        } else if self.echo == self.put {
            self.state.insert(RingState::CANT_ECHO);
        }

        if self.is_empty() {
            Ok((byte, Drain::NowEmpty))
        } else {
            Ok((byte, Drain::MoreRemains))
        }
    }

    fn fill_after_put(&mut self) -> Fill {
        if self.put == self.get {
            self.state.insert(RingState::CANT_PUT);
            Fill::NowFull
        } else {
            Fill::SpaceRemains
        }
    }

    const fn advance(index: usize) -> usize {
        let next = index + 1;
        if next == N {
            0
        } else {
            next
        }
    }

    const fn retreat(index: usize) -> usize {
        if index == 0 {
            N - 1
        } else {
            index - 1
        }
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
