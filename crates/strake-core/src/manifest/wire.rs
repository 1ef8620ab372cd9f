//! The transport seam.
//!
//! The asynchronous command transport lives outside this crate; what the
//! core needs from it is the ability to move one framed record at a time.
//! [`FramedChannel`] adapts any blocking byte stream pair with the shared
//! framing, producing the same bytes a manifest file carries.

use std::io::{Read, Write};

use crate::error::Result;

use super::framing::{read_frame, write_frame};
use super::record::ManifestRecord;
use super::{RecordSink, RecordSource};

/// A bidirectional record stream between client and server. Blocking sends
/// provide the pipeline's backpressure; timeouts and reconnection belong to
/// the transport implementation.
pub trait RecordChannel: RecordSource + RecordSink {}

impl<T: RecordSource + RecordSink + ?Sized> RecordChannel for T {}

/// Record channel over a blocking reader/writer pair.
pub struct FramedChannel<R: Read, W: Write> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> FramedChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: Read, W: Write> RecordSource for FramedChannel<R, W> {
    fn next_record(&mut self) -> Result<Option<ManifestRecord>> {
        read_frame(&mut self.reader)?
            .map(|f| ManifestRecord::from_frame(f.symbol, f.payload))
            .transpose()
    }
}

impl<R: Read, W: Write> RecordSink for FramedChannel<R, W> {
    fn write_record(&mut self, record: &ManifestRecord) -> Result<()> {
        write_frame(&mut self.writer, record.symbol(), record.payload().as_bytes())?;
        // One record, one flush: the peer must see each command as soon as
        // it is complete.
        self.writer.flush()?;
        Ok(())
    }
}
