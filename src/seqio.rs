//! Sequence I/O Module
//!
//! Reads FASTA records from files (plain or gzip-compressed) and from
//! in-memory text, and classifies sequences by alphabet.
//!
//! # Alphabets
//! - Nucleotide: `GATCRYWSMKHBVDN` (IUPAC, no gaps)
//! - Protein: the 20 standard amino acids `ACDEFGHIKLMNPQRSTVWY`
//!
//! A nucleotide sequence is also a valid protein sequence, so
//! [`is_protein_and_not_dna`] exists for callers that need the distinction.
//!
//! # Examples
//! ```
//! use blastrun::seqio::{is_dna, FastaReader};
//!
//! let text = ">q1 first\nACGT\nACGT\n>q2\nGGCC\n";
//! let records: Vec<_> = FastaReader::from_text(text).collect::<Result<_, _>>().unwrap();
//! assert_eq!(records[0].name, "q1");
//! assert_eq!(records[0].seq, "ACGTACGT");
//! assert!(is_dna(text).unwrap());
//! ```

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

use crate::error::{BlastError, Result};

const DNA_ALPHABET: &[u8] = b"GATCRYWSMKHBVDN";
const PROTEIN_ALPHABET: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

// ============================================================================
// FASTA Format
// ============================================================================

/// A FASTA record containing sequence name and residues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Sequence identifier (text after '>' up to the first whitespace).
    pub name: String,
    /// Residues concatenated from all sequence lines.
    pub seq: String,
}

/// Sequential reader for FASTA input.
///
/// Handles multi-line sequences and strips line endings. Blank lines and
/// text before the first header are ignored; a source without any header
/// yields no records.
pub struct FastaReader<R: BufRead> {
    reader: R,
    line_buf: String,
    current_name: Option<String>,
    primed: bool,
}

impl FastaReader<Box<dyn BufRead>> {
    /// Opens a FASTA file, decompressing it when the name ends in `.gz`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(open_reader(path.as_ref())?))
    }
}

/// Buffered reader over a sequence file, decompressing `.gz` input.
pub(crate) fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BlastError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => e.into(),
    })?;

    if is_gzip_path(path) {
        Ok(Box::new(BufReader::with_capacity(1024 * 1024, MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::with_capacity(1024 * 1024, file)))
    }
}

impl<'a> FastaReader<Cursor<&'a [u8]>> {
    pub fn from_text(text: &'a str) -> Self {
        Self::new(Cursor::new(text.as_bytes()))
    }
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::with_capacity(256),
            current_name: None,
            primed: false,
        }
    }

    /// Skips ahead to the first header line.
    fn prime(&mut self) -> Result<()> {
        self.primed = true;
        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                return Ok(());
            }
            if let Some(header) = self.line_buf.strip_prefix('>') {
                self.current_name = Some(header_name(header));
                return Ok(());
            }
        }
    }

    /// Reads the next FASTA record.
    ///
    /// # Returns
    /// - `Ok(Some(record))` - Successfully read a record
    /// - `Ok(None)` - End of input reached
    /// - `Err(e)` - I/O error occurred
    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        if !self.primed {
            self.prime()?;
        }

        let name = match self.current_name.take() {
            Some(n) => n,
            None => return Ok(None),
        };

        let mut seq = String::with_capacity(1024);

        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                break;
            }

            if let Some(header) = self.line_buf.strip_prefix('>') {
                self.current_name = Some(header_name(header));
                break;
            }
            seq.push_str(self.line_buf.trim());
        }

        Ok(Some(FastaRecord { name, seq }))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn header_name(header: &str) -> String {
    header.split_whitespace().next().unwrap_or("").to_string()
}

pub(crate) fn is_gzip_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// Reads a whole sequence file into memory, decompressing `.gz` input.
pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut text = String::new();
    open_reader(path.as_ref())?.read_to_string(&mut text)?;
    Ok(text)
}

// ============================================================================
// Alphabet checks
// ============================================================================

fn verify_alphabet(seq: &str, letters: &[u8]) -> bool {
    seq.bytes()
        .all(|b| letters.contains(&b.to_ascii_uppercase()))
}

fn all_records_match(fasta: &str, letters: &[u8]) -> Result<bool> {
    for record in FastaReader::from_text(fasta) {
        if !verify_alphabet(&record?.seq, letters) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// True if every record uses only IUPAC nucleotide codes.
pub fn is_dna(fasta: &str) -> Result<bool> {
    all_records_match(fasta, DNA_ALPHABET)
}

/// True if every record uses only the standard amino acids.
///
/// Note: most nucleotide sequences also pass this check.
pub fn is_protein(fasta: &str) -> Result<bool> {
    all_records_match(fasta, PROTEIN_ALPHABET)
}

pub fn is_protein_and_not_dna(fasta: &str) -> Result<bool> {
    if is_dna(fasta)? {
        return Ok(false);
    }
    is_protein(fasta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_multiline_records() {
        let text = ">seq1 description here\nACGT\nTTGG\n\n>seq2\nAAA\n";
        let records: Vec<FastaRecord> = FastaReader::from_text(text)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "seq1");
        assert_eq!(records[0].seq, "ACGTTTGG");
        assert_eq!(records[1].seq, "AAA");
    }

    #[test]
    fn test_no_header_yields_nothing() {
        assert_eq!(FastaReader::from_text("ACGT\nACGT\n").count(), 0);
        assert_eq!(FastaReader::from_text("").count(), 0);
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = ">a\r\nACGT\r\nAC\r\n";
        let record = FastaReader::from_text(text).next().unwrap().unwrap();
        assert_eq!(record.seq, "ACGTAC");
    }

    #[test]
    fn test_alphabet_single() {
        assert!(is_protein(">abc\nATCATCEDAGD").unwrap());
        assert!(!is_protein(">abc\nATCATCXXXX").unwrap());
        assert!(is_dna(">abc\nACGTNRY").unwrap());
        assert!(!is_dna(">abc\nMKVLA").unwrap());
    }

    #[test]
    fn test_alphabet_multi_line() {
        assert!(is_protein(">abc\nATCATCEDAGD\nATCATCEDAGD").unwrap());
        assert!(!is_protein(">abc\nATCATCXXXX\nATCATCXXXX").unwrap());
    }

    #[test]
    fn test_dna_is_also_protein() {
        let dna = ">n1\nACGTACGT\n>n2\nGGCCAATT\n";
        assert!(is_dna(dna).unwrap());
        assert!(is_protein(dna).unwrap());
        assert!(!is_protein_and_not_dna(dna).unwrap());
        assert!(is_protein_and_not_dna(">p1\nMKVLAEEW\n").unwrap());
    }

    #[test]
    fn test_lowercase_accepted() {
        assert!(is_dna(">x\nacgtn\n").unwrap());
    }

    #[test]
    fn test_open_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.fa.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b">g1\nACGT\n").unwrap();
        enc.finish().unwrap();

        let records: Vec<_> = FastaReader::open(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(records, vec![FastaRecord { name: "g1".into(), seq: "ACGT".into() }]);
        assert_eq!(read_to_string(&path).unwrap(), ">g1\nACGT\n");
    }

    #[test]
    fn test_open_missing() {
        let err = FastaReader::open("/nonexistent/q.fa").err().unwrap();
        assert!(matches!(err, BlastError::FileNotFound { .. }));
    }
}
