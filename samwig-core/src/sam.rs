use std::collections::HashMap;

use log::debug;

use crate::errors::{Result, SamWigError};
use crate::models::alignment::SamAlignment;

/// Minimum number of tab separated fields needed to reach CIGAR
const MIN_ALIGNMENT_FIELDS: usize = 6;

/// Largest POS and LN the SAM format allows (2^31 - 1)
pub const MAX_POSITION: u64 = (1 << 31) - 1;

/// One classified line of SAM text
#[derive(Debug, PartialEq)]
pub enum SamLine {
    Header,
    Alignment(SamAlignment),
    Empty,
}

///
/// Reference names and lengths declared by `@SQ` header lines.
///
#[derive(Debug, Default, Clone)]
pub struct SamHeader {
    lengths: HashMap<String, u64>,
}

impl SamHeader {
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Consume one header line. Only `@SQ` lines carry information we need,
    /// every other record type is ignored.
    ///
    pub fn add_line(&mut self, line: &str) -> Result<()> {
        let mut fields = line.split('\t');
        if fields.next() != Some("@SQ") {
            return Ok(());
        }

        let mut name: Option<&str> = None;
        let mut length: Option<&str> = None;
        for field in fields {
            if let Some(value) = field.strip_prefix("SN:") {
                name = Some(value);
            } else if let Some(value) = field.strip_prefix("LN:") {
                length = Some(value);
            }
        }

        let (name, length) = match (name, length) {
            (Some(name), Some(length)) => (name, length),
            _ => {
                return Err(SamWigError::SamParseError(
                    "SAM @SQ header record was missing SN and/or LN".to_string(),
                ));
            }
        };

        let length: u64 = length.trim().parse().map_err(|e| {
            SamWigError::SamParseError(format!("Cannot parse @SQ LN '{}': {}", length, e))
        })?;
        if length == 0 || length > MAX_POSITION {
            return Err(SamWigError::SamParseError(format!(
                "@SQ LN {} for {} is outside 1..={}",
                length, name, MAX_POSITION
            )));
        }

        debug!("@SQ {} length {}", name, length);
        self.lengths.insert(name.to_string(), length);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn reference_length(&self, name: &str) -> Option<u64> {
        self.lengths.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lengths.contains_key(name)
    }
}

///
/// Parse the coverage relevant columns of a SAM alignment line.
///
/// # Arguments
/// - line: alignment line without the trailing newline
///
pub fn parse_alignment(line: &str) -> Result<SamAlignment> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < MIN_ALIGNMENT_FIELDS {
        return Err(SamWigError::SamParseError(format!(
            "expected at least {} tab separated fields, found {}",
            MIN_ALIGNMENT_FIELDS,
            fields.len()
        )));
    }

    let chrom = fields[2];
    if chrom.is_empty() {
        return Err(SamWigError::SamParseError("empty RNAME field".to_string()));
    }

    let pos: u64 = fields[3].parse().map_err(|e| {
        SamWigError::SamParseError(format!("Cannot parse POS '{}': {}", fields[3], e))
    })?;
    if pos > MAX_POSITION {
        return Err(SamWigError::SamParseError(format!(
            "POS {} is larger than {}",
            pos, MAX_POSITION
        )));
    }

    Ok(SamAlignment {
        chrom: chrom.to_string(),
        pos,
        cigar: fields[5].to_string(),
    })
}

///
/// Classify a line of SAM text and parse it when it is an alignment.
/// Header lines are returned as [SamLine::Header] for the caller to feed into a [SamHeader].
///
pub fn parse_sam_line(line: &str) -> Result<SamLine> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return Ok(SamLine::Empty);
    }
    if line.starts_with('@') {
        return Ok(SamLine::Header);
    }
    parse_alignment(line).map(SamLine::Alignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn test_header_sq_lines() {
        let mut header = SamHeader::new();
        header.add_line("@HD\tVN:1.6\tSO:coordinate").unwrap();
        header.add_line("@SQ\tSN:chr1\tLN:248956422").unwrap();
        header.add_line("@SQ\tLN:242193529\tSN:chr2\tM5:abc").unwrap();
        header.add_line("@PG\tID:bwa\tPN:bwa").unwrap();

        assert!(!header.is_empty());
        assert_eq!(header.reference_length("chr1"), Some(248956422));
        assert_eq!(header.reference_length("chr2"), Some(242193529));
        assert_eq!(header.reference_length("chr3"), None);
        assert!(header.contains("chr2"));
        assert!(!header.contains("chr3"));
    }

    #[rstest]
    #[case("@SQ\tSN:chr1")]
    #[case("@SQ\tLN:100")]
    #[case("@SQ\tSN:chr1\tLN:many")]
    #[case("@SQ\tSN:chr1\tLN:0")]
    #[case("@SQ\tSN:chr1\tLN:2147483648")]
    #[case("@SQ\tSN:chr1\tLN:18446744073709551615")]
    fn test_bad_sq_lines(#[case] line: &str) {
        let mut header = SamHeader::new();
        assert!(matches!(
            header.add_line(line),
            Err(SamWigError::SamParseError(_))
        ));
    }

    #[rstest]
    fn test_parse_alignment() {
        let line = "read1\t0\tchr1\t100\t60\t3M2I4M\t*\t0\t0\tACGTACGTA\tIIIIIIIII";
        let record = parse_alignment(line).unwrap();
        assert_eq!(
            record,
            SamAlignment {
                chrom: "chr1".to_string(),
                pos: 100,
                cigar: "3M2I4M".to_string(),
            }
        );
    }

    #[rstest]
    #[case("read1\t0\tchr1\t100\t60")]
    #[case("read1\t0\tchr1\tabc\t60\t5M")]
    #[case("read1\t0\tchr1\t-5\t60\t5M")]
    #[case("read1\t0\t\t100\t60\t5M")]
    #[case("read1\t0\tchr1\t2147483648\t60\t5M")]
    #[case("read1\t0\tchr1\t18446744073709551615\t60\t5M")]
    fn test_parse_alignment_errors(#[case] line: &str) {
        assert!(matches!(
            parse_alignment(line),
            Err(SamWigError::SamParseError(_))
        ));
    }

    #[rstest]
    fn test_largest_valid_position() {
        let record = parse_alignment("read1\t0\tchr1\t2147483647\t60\t1M").unwrap();
        assert_eq!(record.pos, MAX_POSITION);

        let mut header = SamHeader::new();
        header.add_line("@SQ\tSN:chr1\tLN:2147483647").unwrap();
        assert_eq!(header.reference_length("chr1"), Some(MAX_POSITION));
    }

    #[rstest]
    fn test_classify_lines() {
        assert_eq!(parse_sam_line("@SQ\tSN:chr1\tLN:10\n").unwrap(), SamLine::Header);
        assert_eq!(parse_sam_line("\r\n").unwrap(), SamLine::Empty);
        assert!(matches!(
            parse_sam_line("r\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n").unwrap(),
            SamLine::Alignment(record) if record.is_unmapped()
        ));
    }
}
