//! CIGAR parsing and extraction of the reference spans an alignment covers.
//!
//! Coverage counts `M`, `=`, `X` and `D`. `N` moves along the reference without
//! covering it and so splits an alignment into several spans. `I`, `S`, `H` and
//! `P` never touch the reference.

use crate::errors::{Result, SamWigError};
use crate::models::alignment::UNMAPPED;
use crate::models::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOpKind {
    /// M, =, X, D: consumes reference and counts as coverage
    Covering,
    /// N: consumes reference, no coverage
    Skip,
    /// I, S, H, P
    NoRefConsumption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub len: u64,
    pub code: char,
}

impl CigarOp {
    pub fn kind(&self) -> CigarOpKind {
        match self.code {
            'M' | '=' | 'X' | 'D' => CigarOpKind::Covering,
            'N' => CigarOpKind::Skip,
            _ => CigarOpKind::NoRefConsumption,
        }
    }

    pub fn consumes_reference(&self) -> bool {
        self.kind() != CigarOpKind::NoRefConsumption
    }
}

fn invalid(cigar: &str, reason: impl Into<String>) -> SamWigError {
    SamWigError::CigarParseError {
        cigar: cigar.to_string(),
        reason: reason.into(),
    }
}

///
/// Parse a CIGAR string into its operations.
///
/// # Arguments
/// - cigar: CIGAR string, e.g. `3M2I4M`. `*` yields no operations.
///
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>> {
    if cigar == UNMAPPED {
        return Ok(Vec::new());
    }
    if cigar.is_empty() {
        return Err(invalid(cigar, "empty string"));
    }

    let mut ops = Vec::with_capacity(cigar.len() / 2);
    let mut len: Option<u64> = None;

    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            let next = len
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|l| l.checked_add(digit as u64))
                .ok_or_else(|| invalid(cigar, "operation length overflows"))?;
            len = Some(next);
            continue;
        }

        match c {
            'M' | 'I' | 'D' | 'N' | 'S' | 'H' | 'P' | '=' | 'X' => {
                let len = len
                    .take()
                    .ok_or_else(|| invalid(cigar, format!("operation '{}' has no length", c)))?;
                ops.push(CigarOp { len, code: c });
            }
            _ => return Err(invalid(cigar, format!("unknown operation '{}'", c))),
        }
    }

    if len.is_some() {
        return Err(invalid(cigar, "trailing length without an operation"));
    }

    Ok(ops)
}

fn advance(cigar: &str, ref_pos: u64, len: u64) -> Result<u64> {
    ref_pos
        .checked_add(len)
        .ok_or_else(|| invalid(cigar, "alignment end overflows the reference coordinate range"))
}

///
/// Convert an alignment start and CIGAR into the half-open reference spans it covers.
/// Consecutive covering operations are merged, `N` closes the current span.
///
/// # Arguments
/// - pos: 1-based leftmost position (SAM POS)
/// - cigar: CIGAR string
///
pub fn extract_spans(pos: u64, cigar: &str) -> Result<Vec<Span>> {
    let ops = parse_cigar(cigar)?;

    let mut spans: Vec<Span> = Vec::new();
    let mut ref_pos = pos;
    let mut open: Option<u64> = None;

    for op in ops.iter() {
        match op.kind() {
            CigarOpKind::Covering => {
                if open.is_none() && op.len > 0 {
                    open = Some(ref_pos);
                }
                ref_pos = advance(cigar, ref_pos, op.len)?;
            }
            CigarOpKind::Skip => {
                if let Some(start) = open.take() {
                    spans.push(Span::new(start, ref_pos));
                }
                ref_pos = advance(cigar, ref_pos, op.len)?;
            }
            CigarOpKind::NoRefConsumption => {}
        }
    }

    if let Some(start) = open {
        spans.push(Span::new(start, ref_pos));
    }

    Ok(spans)
}

/// Number of reference bases the CIGAR consumes (M, =, X, D, N)
pub fn reference_length(cigar: &str) -> Result<u64> {
    parse_cigar(cigar)?
        .iter()
        .filter(|op| op.consumes_reference())
        .try_fold(0u64, |total, op| advance(cigar, total, op.len))
}

/// Number of bases that receive coverage from a set of spans
pub fn covered_length(spans: &[Span]) -> u64 {
    spans.iter().map(Span::len).sum()
}
