//! Core types for turning SAM alignments into coverage tracks.
//!
//! This crate holds everything that does not depend on how coverage is accumulated:
//! the error type shared by the workspace, the [Span](models::Span) model, CIGAR span
//! extraction, SAM line and `@SQ` header parsing, and plain/gzip input readers.
//!
//! ```rust
//! use samwig_core::cigar::extract_spans;
//! use samwig_core::models::Span;
//!
//! // 3 matched bases, a 2 base insertion, 4 more matched bases
//! let spans = extract_spans(10, "3M2I4M").unwrap();
//! assert_eq!(spans, vec![Span::new(10, 17)]);
//! ```
pub mod cigar;
pub mod errors;
pub mod models;
pub mod sam;
pub mod utils;
