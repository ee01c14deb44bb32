//! Readiness signal sent to the launcher over stdout

use std::io::{self, Write};

/// Single-use readiness sender; `signal` consumes it.
pub struct ReadinessSender<W: Write> {
    out: W,
}

impl ReadinessSender<io::Stdout> {
    /// Sender writing to this process's stdout
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ReadinessSender<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Tell the parent the worker is ready
    pub fn signal(mut self) -> io::Result<()> {
        self.out.write_all(b"1")?;
        self.out.flush()
    }
}
