//! Routed record output: one writer per destination bin and mate.
//!
//! The router owns every output writer for a run: one per filter label plus
//! the no-match and multi-match bins, doubled per mate for paired input.
//! It lives on the single writer thread, so each destination is written
//! serially by construction. Compression is selected behind a small factory:
//! callers hold a [`SieveWriter`] and never care whether bytes pass through
//! gzip on the way down.

use flate2::Compression;
use flate2::write::GzEncoder;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{Result, SieveError};
use crate::records::ReadRecord;
use crate::results::Destination;

/// Which mate a routed record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mate {
    /// Single-end record
    Single,
    /// First mate of a pair
    First,
    /// Second mate of a pair
    Second,
}

/// An output writer with compression chosen at creation.
pub enum SieveWriter {
    /// Uncompressed output
    Plain(BufWriter<File>),
    /// Gzip-compressed output
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Write for SieveWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            SieveWriter::Plain(w) => w.write(buf),
            SieveWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            SieveWriter::Plain(w) => w.flush(),
            SieveWriter::Gzip(w) => w.flush(),
        }
    }
}

impl SieveWriter {
    /// Creates a writer for `path`, gzip-compressed when `gzip` is set.
    pub fn create(path: &Path, gzip: bool) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| SieveError::Output { path: path.to_path_buf(), source: e })?;
        let buffered = BufWriter::new(file);
        if gzip {
            Ok(SieveWriter::Gzip(GzEncoder::new(buffered, Compression::default())))
        } else {
            Ok(SieveWriter::Plain(buffered))
        }
    }

    /// Terminates the stream and flushes everything to disk. Required for
    /// gzip output; harmless for plain output.
    pub fn finish(self, path: &Path) -> Result<()> {
        let map = |e| SieveError::Output { path: path.to_path_buf(), source: e };
        match self {
            SieveWriter::Plain(mut w) => w.flush().map_err(map),
            SieveWriter::Gzip(w) => {
                let mut inner = w.finish().map_err(map)?;
                inner.flush().map_err(map)
            }
        }
    }
}

/// One destination bin's writers: a single writer, or one per mate.
struct BinWriters {
    mate1: (PathBuf, SieveWriter),
    mate2: Option<(PathBuf, SieveWriter)>,
}

/// Routes classified records to their destination files.
pub struct OutputRouter {
    bins: Vec<BinWriters>,
    num_filters: usize,
}

impl OutputRouter {
    /// Creates every destination writer up front.
    ///
    /// File names follow `{prefix}_{label}[_{mate}].{ext}{postfix}` where
    /// `ext` is `fq` when the routed records carry qualities and `fa`
    /// otherwise, and `postfix` is `.gz` for compressed output.
    pub fn new(
        prefix: &str,
        labels: &[String],
        paired: bool,
        fastq: bool,
        gzip: bool,
    ) -> Result<Self> {
        let ext = if fastq { "fq" } else { "fa" };
        let postfix = if gzip { ".gz" } else { "" };

        let mut bin_labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        bin_labels.push(crate::results::NO_MATCH_LABEL);
        bin_labels.push(crate::results::MULTI_MATCH_LABEL);

        let mut bins = Vec::with_capacity(bin_labels.len());
        for label in bin_labels {
            let open = |mate: &str| -> Result<(PathBuf, SieveWriter)> {
                let path = PathBuf::from(format!("{prefix}_{label}{mate}.{ext}{postfix}"));
                let writer = SieveWriter::create(&path, gzip)?;
                Ok((path, writer))
            };
            let bin = if paired {
                BinWriters { mate1: open("_1")?, mate2: Some(open("_2")?) }
            } else {
                BinWriters { mate1: open("")?, mate2: None }
            };
            bins.push(bin);
        }
        Ok(Self { bins, num_filters: labels.len() })
    }

    /// Appends a record to its destination writer.
    pub fn write(&mut self, dest: Destination, mate: Mate, record: &ReadRecord) -> Result<()> {
        let bin = &mut self.bins[dest.index(self.num_filters)];
        let (path, writer) = match mate {
            Mate::Single | Mate::First => &mut bin.mate1,
            Mate::Second => bin
                .mate2
                .as_mut()
                .expect("paired record routed through a single-end router"),
        };
        write_record(writer, record)
            .map_err(|e| SieveError::Output { path: path.clone(), source: e })
    }

    /// Flushes and closes every writer exactly once, reporting each written
    /// path.
    pub fn finish(self) -> Result<()> {
        for bin in self.bins {
            for (path, writer) in
                std::iter::once(bin.mate1).chain(bin.mate2)
            {
                writer.finish(&path)?;
                info!("File written to: {}", path.display());
            }
        }
        Ok(())
    }
}

/// Writes one record in FASTA or FASTQ layout depending on whether it
/// carries qualities.
fn write_record<W: Write>(writer: &mut W, record: &ReadRecord) -> std::io::Result<()> {
    let head: &str = &record.id;
    if record.is_fastq() {
        match &record.desc {
            Some(desc) => writeln!(writer, "@{head} {desc}")?,
            None => writeln!(writer, "@{head}")?,
        }
        writer.write_all(&record.seq)?;
        writeln!(writer, "\n+")?;
        writer.write_all(&record.qual)?;
        writeln!(writer)?;
    } else {
        match &record.desc {
            Some(desc) => writeln!(writer, ">{head} {desc}")?,
            None => writeln!(writer, ">{head}")?,
        }
        writer.write_all(&record.seq)?;
        writeln!(writer)?;
    }
    Ok(())
}
