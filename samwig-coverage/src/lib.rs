//! Coverage depth tracks from coordinate sorted SAM alignments.
//!
//! Alignments are streamed once. Each one is reduced to its reference spans,
//! folded into a sliding [CoverageAccumulator](accumulator::CoverageAccumulator)
//! and every run of constant depth is written out as soon as no later
//! alignment can change it. Memory therefore depends on how many alignments
//! overlap at once, never on the size of a chromosome.
//!
//! fixedStep tracks can instead report how many alignments touch each window
//! ([FixedValue::Reads]), counted by a [WindowReadCounter].
//!
//! ```rust
//! use std::io::Cursor;
//! use samwig_coverage::{CoverageConfig, sam_to_wig};
//!
//! let sam = "r1\t0\tchr1\t1\t60\t5M\t*\t0\t0\t*\t*\nr2\t0\tchr1\t3\t60\t5M\t*\t0\t0\t*\t*\n";
//! let mut out = Vec::new();
//! let stats = sam_to_wig(Cursor::new(sam), &mut out, &CoverageConfig::default()).unwrap();
//!
//! assert_eq!(stats.runs, 3);
//! assert!(String::from_utf8(out).unwrap().contains("3 2\n"));
//! ```
pub mod accumulator;
pub mod config;
pub mod stream;
pub mod wig;
pub mod windows;

pub use accumulator::{CoverageAccumulator, CoverageRun, TrackEvent};
pub use config::{CoverageConfig, ParseErrorPolicy};
pub use stream::{SamCoverageProcessor, StreamStats, sam_to_wig, sam_to_wig_with_progress};
pub use wig::{FixedValue, TrackFormat, TrackWriter};
pub use windows::WindowReadCounter;
