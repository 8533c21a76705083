use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamWigError {
    #[error("Malformed CIGAR string '{cigar}': {reason}")]
    CigarParseError { cigar: String, reason: String },

    #[error("Error parsing SAM record: {0}")]
    SamParseError(String),

    #[error("Reference '{0}' is not declared in the SAM @SQ headers")]
    UnknownReference(String),

    /// An alignment starts before positions that were already emitted.
    #[error(
        "Ordering violation: alignment on {chrom} at position {position} precedes the coverage window at {anchor}. Input must be coordinate sorted"
    )]
    OrderingViolation {
        chrom: String,
        position: u64,
        anchor: u64,
    },

    /// A reference shows up again after its coverage was flushed.
    #[error(
        "Ordering violation: reference '{0}' appears again after it was already completed. Input must be grouped by reference"
    )]
    InterleavedReference(String),

    #[error("Line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<SamWigError>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SamWigError {
    /// Attach a 1-based input line number to this error.
    pub fn at_line(self, line: usize) -> Self {
        SamWigError::AtLine {
            line,
            source: Box::new(self),
        }
    }

    /// Parse errors are the only ones the pipeline may skip over.
    pub fn is_parse_error(&self) -> bool {
        match self {
            SamWigError::CigarParseError { .. }
            | SamWigError::SamParseError(_)
            | SamWigError::UnknownReference(_) => true,
            SamWigError::AtLine { source, .. } => source.is_parse_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SamWigError>;
