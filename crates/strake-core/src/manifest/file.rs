//! Manifest files: the record framing of [`super::framing`], optionally
//! gzip-wrapped. Full manifests conventionally end in `.gz`; phase-1 scan
//! manifests are written plain so they can be tailed cheaply.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::Result;

use super::framing::{read_frame, write_frame};
use super::record::ManifestRecord;
use super::{RecordSink, RecordSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Plain,
    Gzip,
}

impl ManifestFormat {
    /// Format implied by a manifest file name.
    pub fn for_path(path: &Path) -> Self {
        if path.extension().is_some_and(|e| e == "gz") {
            ManifestFormat::Gzip
        } else {
            ManifestFormat::Plain
        }
    }
}

enum ReaderInner<R: Read> {
    Plain(BufReader<R>),
    Gzip(BufReader<GzDecoder<R>>),
}

pub struct ManifestReader<R: Read> {
    inner: ReaderInner<R>,
}

impl<R: Read> ManifestReader<R> {
    pub fn plain(reader: R) -> Self {
        Self {
            inner: ReaderInner::Plain(BufReader::new(reader)),
        }
    }

    pub fn gzip(reader: R) -> Self {
        Self {
            inner: ReaderInner::Gzip(BufReader::new(GzDecoder::new(reader))),
        }
    }
}

impl ManifestReader<File> {
    /// Open a manifest file, choosing the format from its extension.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(match ManifestFormat::for_path(path) {
            ManifestFormat::Plain => Self::plain(file),
            ManifestFormat::Gzip => Self::gzip(file),
        })
    }
}

impl<R: Read> RecordSource for ManifestReader<R> {
    fn next_record(&mut self) -> Result<Option<ManifestRecord>> {
        let frame = match &mut self.inner {
            ReaderInner::Plain(r) => read_frame(r)?,
            ReaderInner::Gzip(r) => read_frame(r)?,
        };
        frame
            .map(|f| ManifestRecord::from_frame(f.symbol, f.payload))
            .transpose()
    }
}

enum WriterInner<W: Write> {
    Plain(BufWriter<W>),
    Gzip(GzEncoder<BufWriter<W>>),
}

pub struct ManifestWriter<W: Write> {
    inner: WriterInner<W>,
}

impl<W: Write> ManifestWriter<W> {
    pub fn plain(writer: W) -> Self {
        Self {
            inner: WriterInner::Plain(BufWriter::new(writer)),
        }
    }

    pub fn gzip(writer: W) -> Self {
        Self {
            inner: WriterInner::Gzip(GzEncoder::new(
                BufWriter::new(writer),
                flate2::Compression::default(),
            )),
        }
    }

    /// Flush buffered records and, for gzip manifests, write the stream
    /// trailer. Dropping an unfinished gzip writer loses the trailer, so
    /// call this once the manifest is complete.
    pub fn finish(self) -> Result<()> {
        match self.inner {
            WriterInner::Plain(mut w) => w.flush()?,
            WriterInner::Gzip(gz) => {
                let mut w = gz.finish()?;
                w.flush()?;
            }
        }
        Ok(())
    }
}

impl ManifestWriter<File> {
    /// Create a manifest file, choosing the format from its extension.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(match ManifestFormat::for_path(path) {
            ManifestFormat::Plain => Self::plain(file),
            ManifestFormat::Gzip => Self::gzip(file),
        })
    }
}

impl<W: Write> RecordSink for ManifestWriter<W> {
    fn write_record(&mut self, record: &ManifestRecord) -> Result<()> {
        let payload = record.payload();
        match &mut self.inner {
            WriterInner::Plain(w) => write_frame(w, record.symbol(), payload.as_bytes()),
            WriterInner::Gzip(w) => write_frame(w, record.symbol(), payload.as_bytes()),
        }
    }
}
