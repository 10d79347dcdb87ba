//! Tabular Output Parser
//!
//! Parses BLAST+ `-outfmt 6` output (and the data lines of `-outfmt 7`).
//!
//! # Standard Columns
//! ```text
//! Col  Name      Description
//! 1    qseqid    Query sequence id
//! 2    sseqid    Subject (database) sequence id
//! 3    pident    Percentage of identical matches
//! 4    length    Alignment length
//! 5    mismatch  Number of mismatches
//! 6    gapopen   Number of gap openings
//! 7    qstart    Start of alignment in query
//! 8    qend      End of alignment in query
//! 9    sstart    Start of alignment in subject
//! 10   send      End of alignment in subject
//! 11   evalue    Expect value
//! 12   bitscore  Bit score
//! ```
//!
//! # Example Usage
//! ```
//! use blastrun::tabular::parse_tabular;
//!
//! let out = "q1\tgi|1|ref|NC_1.1|\t100.000\t10\t0\t0\t1\t10\t1\t10\t1e-5\t20.0\n";
//! let hits = parse_tabular(out).unwrap();
//! assert_eq!(hits[0].accession(), "NC_1.1");
//! ```

use std::str::FromStr;

use crate::error::{BlastError, Result};

const N_COLUMNS: usize = 12;

// ============================================================================
// Tabular Hit
// ============================================================================

/// One alignment line of standard tabular output.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularHit {
    pub qseqid: String,
    pub sseqid: String,
    pub pident: f64,
    pub length: usize,
    pub mismatch: usize,
    pub gapopen: usize,
    pub qstart: usize,
    pub qend: usize,
    pub sstart: usize,
    pub send: usize,
    pub evalue: f64,
    pub bitscore: f64,
}

impl TabularHit {
    /// Parses one tab-separated line; extra trailing columns are ignored.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        if fields.len() < N_COLUMNS {
            return Err(BlastError::Parse {
                line: line_no,
                details: format!("expected {} columns, found {}", N_COLUMNS, fields.len()),
            });
        }

        Ok(Self {
            qseqid: fields[0].to_string(),
            sseqid: fields[1].to_string(),
            pident: field(&fields, 2, "pident", line_no)?,
            length: field(&fields, 3, "length", line_no)?,
            mismatch: field(&fields, 4, "mismatch", line_no)?,
            gapopen: field(&fields, 5, "gapopen", line_no)?,
            qstart: field(&fields, 6, "qstart", line_no)?,
            qend: field(&fields, 7, "qend", line_no)?,
            sstart: field(&fields, 8, "sstart", line_no)?,
            send: field(&fields, 9, "send", line_no)?,
            evalue: field(&fields, 10, "evalue", line_no)?,
            bitscore: field(&fields, 11, "bitscore", line_no)?,
        })
    }

    /// Subject on the minus strand (`sstart > send`).
    pub fn is_minus_strand(&self) -> bool {
        self.sstart > self.send
    }

    /// Subject coordinates ordered so that start <= end.
    pub fn subject_range(&self) -> (usize, usize) {
        if self.is_minus_strand() {
            (self.send, self.sstart)
        } else {
            (self.sstart, self.send)
        }
    }

    /// Accession from a `gi|123|db|ACC|` style subject id, or the id as-is.
    pub fn accession(&self) -> &str {
        if self.sseqid.starts_with("gi|") {
            if let Some(acc) = self.sseqid.split('|').nth(3) {
                if !acc.is_empty() {
                    return acc;
                }
            }
        }
        &self.sseqid
    }
}

fn field<T: FromStr>(fields: &[&str], idx: usize, name: &str, line_no: usize) -> Result<T> {
    let raw = fields[idx].trim();
    raw.parse().map_err(|_| BlastError::Parse {
        line: line_no,
        details: format!("invalid {} value {:?}", name, raw),
    })
}

/// Parses every data line, skipping blanks and `#` comment lines.
pub fn parse_tabular(output: &str) -> Result<Vec<TabularHit>> {
    output
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|(i, line)| TabularHit::parse_line(line, i + 1))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str =
        "contig_1\tFAM19036p_000425\t98.500\t200\t3\t0\t1\t200\t450\t251\t2.3e-98\t350.5";

    #[test]
    fn test_parse_line() {
        let hit = TabularHit::parse_line(LINE, 1).unwrap();
        assert_eq!(hit.qseqid, "contig_1");
        assert_eq!(hit.sseqid, "FAM19036p_000425");
        assert_eq!(hit.pident, 98.5);
        assert_eq!(hit.length, 200);
        assert_eq!(hit.evalue, 2.3e-98);
        assert_eq!(hit.bitscore, 350.5);
        assert!(hit.is_minus_strand());
        assert_eq!(hit.subject_range(), (251, 450));
    }

    #[test]
    fn test_outfmt7_comments_skipped() {
        let out = format!("# BLASTN 2.15.0+\n# Fields: ...\n{}\n\n{}\n", LINE, LINE);
        assert_eq!(parse_tabular(&out).unwrap().len(), 2);
        assert!(parse_tabular("").unwrap().is_empty());
    }

    #[test]
    fn test_accession_extraction() {
        let mut hit = TabularHit::parse_line(LINE, 1).unwrap();
        hit.sseqid = "gi|1787534517|gb|CP047050.1|".to_string();
        assert_eq!(hit.accession(), "CP047050.1");
        hit.sseqid = "CP047050.1".to_string();
        assert_eq!(hit.accession(), "CP047050.1");
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(
            TabularHit::parse_line("incomplete\tline", 4),
            Err(BlastError::Parse { line: 4, .. })
        ));
        let bad = LINE.replace("98.500", "high");
        let err = parse_tabular(&format!("{}\n{}\n", LINE, bad)).unwrap_err();
        assert!(matches!(err, BlastError::Parse { line: 2, .. }));
    }
}
