//! Read records and the sources that produce them.
//!
//! The pipeline consumes an abstract stream of `{id, sequence, quality}`
//! records; this module provides the FASTA and FASTQ implementations over
//! plain or gzip-compressed files. Format detection never trusts file
//! extensions: the opener sniffs the gzip magic bytes, unwraps compression
//! below the parser, and then dispatches on the first byte of the payload
//! (`>` for FASTA, `@` for FASTQ).

use flate2::read::MultiGzDecoder;
use seq_io::fasta::Record as FastaRecord;
use seq_io::fastq::Record as FastqRecord;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::errors::{Result, SieveError};

/// One sequencing read. `qual` is empty for FASTA input and always the same
/// length as `seq` for FASTQ. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    /// Read name: the header up to the first whitespace
    pub id: String,
    /// Remainder of the header line, when present
    pub desc: Option<String>,
    /// Sequence bases
    pub seq: Vec<u8>,
    /// Phred+33 quality string; empty for FASTA records
    pub qual: Vec<u8>,
}

impl ReadRecord {
    /// True when the record carries a quality string.
    #[must_use]
    pub fn is_fastq(&self) -> bool {
        !self.qual.is_empty()
    }

    /// Pairing key for interleaved input: the read ID with its trailing
    /// two-character `/1` or `/2` style mate suffix stripped. IDs without
    /// such a suffix will never find a partner and end up as orphans.
    #[must_use]
    pub fn pair_key(&self) -> &str {
        if self.id.len() >= 2 { &self.id[..self.id.len() - 2] } else { &self.id }
    }

    /// Mate number from the final character of the ID: `1` is the first
    /// mate, anything else the second.
    #[must_use]
    pub fn is_first_mate(&self) -> bool {
        self.id.as_bytes().last() == Some(&b'1')
    }

    /// False when the CASAVA 1.8 style comment marks the read as filtered
    /// (`<read>:Y:<control>:<barcode>`). Records without a comment are
    /// considered chaste.
    #[must_use]
    pub fn is_chaste(&self) -> bool {
        match &self.desc {
            Some(desc) => {
                let mut fields = desc.split(':');
                fields.next();
                !matches!(fields.next(), Some("Y"))
            }
            None => true,
        }
    }
}

/// Splits a raw header into the read ID and optional comment.
fn split_head(head: &[u8]) -> (String, Option<String>) {
    let text = String::from_utf8_lossy(head);
    match text.split_once(char::is_whitespace) {
        Some((id, desc)) => {
            let desc = desc.trim_start();
            (id.to_string(), (!desc.is_empty()).then(|| desc.to_string()))
        }
        None => (text.to_string(), None),
    }
}

/// A stream of read records. End of stream is `Ok(None)`; parse failures
/// terminate the run with the offending file reported.
pub trait RecordSource: Send + std::fmt::Debug {
    /// Produces the next record, or `None` at end of stream.
    fn next_record(&mut self) -> Result<Option<ReadRecord>>;
}

struct FastaSource {
    reader: seq_io::fasta::Reader<Box<dyn BufRead + Send>>,
    path: PathBuf,
}

impl std::fmt::Debug for FastaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastaSource").field("path", &self.path).finish()
    }
}

impl RecordSource for FastaSource {
    fn next_record(&mut self) -> Result<Option<ReadRecord>> {
        match self.reader.next() {
            None => Ok(None),
            Some(Err(e)) => Err(SieveError::InputFile {
                path: self.path.clone(),
                reason: format!("malformed FASTA record: {e}"),
            }),
            Some(Ok(record)) => {
                let (id, desc) = split_head(record.head());
                let seq = record.full_seq().into_owned();
                Ok(Some(ReadRecord { id, desc, seq, qual: Vec::new() }))
            }
        }
    }
}

struct FastqSource {
    reader: seq_io::fastq::Reader<Box<dyn BufRead + Send>>,
    path: PathBuf,
}

impl std::fmt::Debug for FastqSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastqSource").field("path", &self.path).finish()
    }
}

impl RecordSource for FastqSource {
    fn next_record(&mut self) -> Result<Option<ReadRecord>> {
        match self.reader.next() {
            None => Ok(None),
            Some(Err(e)) => Err(SieveError::InputFile {
                path: self.path.clone(),
                reason: format!("malformed FASTQ record: {e}"),
            }),
            Some(Ok(record)) => {
                let (id, desc) = split_head(record.head());
                Ok(Some(ReadRecord {
                    id,
                    desc,
                    seq: record.seq().to_vec(),
                    qual: record.qual().to_vec(),
                }))
            }
        }
    }
}

/// Source over a file with no records at all (a legal, empty input).
#[derive(Debug)]
struct EmptySource;

impl RecordSource for EmptySource {
    fn next_record(&mut self) -> Result<Option<ReadRecord>> {
        Ok(None)
    }
}

/// Opens a record source over `path`, unwrapping gzip compression and
/// detecting FASTA vs FASTQ from the payload's first byte.
pub fn open_record_source(path: &Path) -> Result<Box<dyn RecordSource>> {
    let file = File::open(path).map_err(|e| SieveError::InputFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut buffered = BufReader::with_capacity(64 * 1024, file);

    let head = buffered.fill_buf().map_err(|e| SieveError::InputFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let gzipped = head.starts_with(&[0x1f, 0x8b]);

    let mut reader: Box<dyn BufRead + Send> = if gzipped {
        Box::new(BufReader::with_capacity(64 * 1024, MultiGzDecoder::new(buffered)))
    } else {
        Box::new(buffered)
    };

    let first = reader
        .fill_buf()
        .map_err(|e| SieveError::InputFile { path: path.to_path_buf(), reason: e.to_string() })?
        .first()
        .copied();

    match first {
        None => Ok(Box::new(EmptySource)),
        Some(b'>') => Ok(Box::new(FastaSource {
            reader: seq_io::fasta::Reader::new(reader),
            path: path.to_path_buf(),
        })),
        Some(b'@') => Ok(Box::new(FastqSource {
            reader: seq_io::fastq::Reader::new(reader),
            path: path.to_path_buf(),
        })),
        Some(other) => Err(SieveError::InputFile {
            path: path.to_path_buf(),
            reason: format!(
                "unrecognized format: expected '>' (FASTA) or '@' (FASTQ), found '{}'",
                other as char
            ),
        }),
    }
}
