//! Scoped output bridge between the engine and a caller-supplied sink.

use crate::handle::{EngineResource, Handle};
use crate::XtrustError;
use std::io::Write;

pub(crate) struct BioBuffer(Vec<u8>);

impl EngineResource for BioBuffer {
    const KIND: &'static str = "bio";
}

/// Collects engine output for a single call, then hands it to the sink.
///
/// Nothing reaches the sink until [`Bio::finish`]; a `Bio` dropped early
/// discards what it buffered, so a failed call never leaves half-written
/// output behind.
pub struct Bio<'w, W: Write> {
    buffer: Handle<BioBuffer>,
    sink: &'w mut W,
}

impl<'w, W: Write> Bio<'w, W> {
    pub fn new(sink: &'w mut W) -> Self {
        Bio {
            buffer: Handle::new(BioBuffer(Vec::new())),
            sink,
        }
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), XtrustError> {
        self.buffer.get_mut()?.0.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Flush the buffered output to the sink and release the buffer.
    pub fn finish(mut self) -> Result<(), XtrustError> {
        let buffered = std::mem::take(&mut self.buffer.get_mut()?.0);
        self.buffer.close();
        self.sink.write_all(&buffered)?;
        self.sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn output_reaches_sink_only_on_finish() {
        let mut sink = Vec::new();
        {
            let mut bio = Bio::new(&mut sink);
            bio.write_str("discarded").unwrap();
        }
        assert!(sink.is_empty());

        let mut bio = Bio::new(&mut sink);
        bio.write_str("hello ").unwrap();
        bio.write_str("world").unwrap();
        bio.finish().unwrap();
        assert_eq!(sink, b"hello world");
    }
}
