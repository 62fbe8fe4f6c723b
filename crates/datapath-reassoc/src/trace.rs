use std::{
    fmt,
    io::{self, Write},
};

/// A free-form diagnostic sink for chain rewrites.
///
/// Records each chain's leaf decomposition, the partition decisions of
/// the balancer, and block text before and after a rewrite. Writes are
/// best-effort: the sink never fails the pass.
pub struct ChainTrace<W = io::Sink> {
    out: W,
}

impl ChainTrace<io::Sink> {
    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { out: io::sink() }
    }
}

impl<W: Write> ChainTrace<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    pub(crate) fn note(&mut self, args: fmt::Arguments<'_>) {
        let _ = self.out.write_fmt(args);
        let _ = self.out.write_all(b"\n");
    }

    /// Flushes buffered trace output.
    pub fn flush(&mut self) {
        let _ = self.out.flush();
    }
}
