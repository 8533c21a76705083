use std::fmt::{self, Display};

use crate::cigar::extract_spans;
use crate::errors::Result;
use crate::models::span::Span;

pub const UNMAPPED: &str = "*";

///
/// The part of a SAM alignment line needed for coverage: RNAME, POS and CIGAR
///
#[derive(Eq, PartialEq, Hash, Debug, Clone)]
pub struct SamAlignment {
    pub chrom: String,
    /// 1-based leftmost mapping position, 0 when unmapped
    pub pos: u64,
    pub cigar: String,
}

impl SamAlignment {
    ///
    /// Records without a reference, position or CIGAR contribute no coverage
    ///
    pub fn is_unmapped(&self) -> bool {
        self.chrom == UNMAPPED || self.pos == 0 || self.cigar == UNMAPPED
    }

    ///
    /// Reference spans covered by this alignment, empty when unmapped
    ///
    pub fn spans(&self) -> Result<Vec<Span>> {
        if self.is_unmapped() {
            return Ok(Vec::new());
        }
        extract_spans(self.pos, &self.cigar)
    }
}

impl Display for SamAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.chrom, self.pos, self.cigar)
    }
}
