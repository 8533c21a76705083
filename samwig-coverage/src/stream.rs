//! Streaming SAM to coverage track pipeline - constant memory regardless of chromosome size.
//!
//! Input is read line by line through a buffered (optionally gzip decoding)
//! reader, alignments are folded into a [CoverageAccumulator] (or a
//! [WindowReadCounter] for fixedStep read counts) and whatever coverage
//! became final is written out after every line.

use std::collections::HashSet;
use std::fmt::{self, Display};
use std::io::{self, BufRead, Read, Write};

use indicatif::ProgressBar;
use log::{debug, info, warn};

use samwig_core::errors::{Result, SamWigError};
use samwig_core::models::{SamAlignment, Span};
use samwig_core::sam::{MAX_POSITION, SamHeader, SamLine, parse_sam_line};
use samwig_core::utils::{IO_BUFFER_SIZE, get_dynamic_reader_from};

use crate::accumulator::{CoverageAccumulator, TrackEvent};
use crate::config::{CoverageConfig, ParseErrorPolicy};
use crate::wig::{FixedValue, TrackFormat, TrackWriter, write_track_line};
use crate::windows::WindowReadCounter;

/// Lines between progress bar updates
const PROGRESS_INTERVAL: usize = 10_000;

// ──────────────────────────────────────────────
// Public types
// ──────────────────────────────────────────────

/// Counters collected over one run of the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub lines: usize,
    /// alignment records that were used, unmapped ones included
    pub alignments: usize,
    pub unmapped: usize,
    pub skipped: usize,
    pub references: usize,
    pub runs: usize,
}

impl Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines, {} alignments ({} unmapped), {} skipped, {} references, {} runs",
            self.lines, self.alignments, self.unmapped, self.skipped, self.references, self.runs
        )
    }
}

// ──────────────────────────────────────────────
// Streaming processor
// ──────────────────────────────────────────────

/// Where mapped alignments are folded into track events
enum CoverageSink {
    Depth(CoverageAccumulator),
    Reads(WindowReadCounter),
}

impl CoverageSink {
    fn add_alignment(&mut self, chrom: &str, pos: u64, spans: &[Span]) -> Result<()> {
        match self {
            CoverageSink::Depth(acc) => acc.add_alignment(chrom, pos, spans),
            CoverageSink::Reads(counter) => counter.add_alignment(chrom, pos, spans),
        }
    }

    fn flush(&mut self) {
        match self {
            CoverageSink::Depth(acc) => acc.flush(),
            CoverageSink::Reads(counter) => counter.flush(),
        }
    }

    fn drain_events(&mut self) -> Vec<TrackEvent> {
        match self {
            CoverageSink::Depth(acc) => acc.drain_events(),
            CoverageSink::Reads(counter) => counter.drain_events(),
        }
    }
}

/// Streaming processor for SAM text.
/// Memory usage: O(open alignments) for the pending coverage window.
pub struct SamCoverageProcessor {
    header: SamHeader,
    sink: CoverageSink,
    policy: ParseErrorPolicy,
    stats: StreamStats,
    clamped: HashSet<String>, // references that already had a span clamped
}

impl SamCoverageProcessor {
    /// Depth coverage, dropping runs below `min_depth`.
    pub fn new(min_depth: u32, policy: ParseErrorPolicy) -> Self {
        Self::with_sink(CoverageSink::Depth(CoverageAccumulator::new(min_depth)), policy)
    }

    /// Alignments per window of `window` bases, dropping windows below `min_count`.
    pub fn counting_reads(window: u64, min_count: u32, policy: ParseErrorPolicy) -> Self {
        Self::with_sink(
            CoverageSink::Reads(WindowReadCounter::new(window, min_count)),
            policy,
        )
    }

    fn with_sink(sink: CoverageSink, policy: ParseErrorPolicy) -> Self {
        Self {
            header: SamHeader::new(),
            sink,
            policy,
            stats: StreamStats::default(),
            clamped: HashSet::new(),
        }
    }

    pub fn from_config(config: &CoverageConfig) -> Self {
        match (config.format, config.fixed_value) {
            (TrackFormat::Fixed, FixedValue::Reads) => {
                Self::counting_reads(config.window, config.min_depth, config.on_parse_error)
            }
            _ => Self::new(config.min_depth, config.on_parse_error),
        }
    }

    pub fn header(&self) -> &SamHeader {
        &self.header
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    ///
    /// Process one line of SAM text (with or without its line terminator).
    ///
    /// Parse failures are skipped or returned depending on the [ParseErrorPolicy].
    /// Ordering violations are always returned. Returned errors carry the line number.
    ///
    pub fn process_line(&mut self, line: &str) -> Result<()> {
        self.stats.lines += 1;
        let line_number = self.stats.lines;

        match self.process_record(line) {
            Ok(()) => Ok(()),
            Err(e) if e.is_parse_error() && self.policy == ParseErrorPolicy::Skip => {
                warn!("Skipping line {}: {}", line_number, e);
                self.stats.skipped += 1;
                Ok(())
            }
            Err(e) => Err(e.at_line(line_number)),
        }
    }

    fn process_record(&mut self, line: &str) -> Result<()> {
        match parse_sam_line(line)? {
            SamLine::Empty => Ok(()),
            SamLine::Header => self.header.add_line(line.trim_end_matches(['\n', '\r'])),
            SamLine::Alignment(alignment) => self.process_alignment(alignment),
        }
    }

    fn process_alignment(&mut self, alignment: SamAlignment) -> Result<()> {
        if alignment.is_unmapped() {
            self.stats.alignments += 1;
            self.stats.unmapped += 1;
            return Ok(());
        }

        // references must be declared once the header names any
        if !self.header.is_empty() && !self.header.contains(&alignment.chrom) {
            return Err(SamWigError::UnknownReference(alignment.chrom));
        }

        let mut spans = alignment.spans()?;
        if let Some(length) = self.header.reference_length(&alignment.chrom) {
            if clamp_spans(&mut spans, length) {
                if self.clamped.insert(alignment.chrom.clone()) {
                    warn!(
                        "Alignment {} extends past the end of {} (length {}), clamping",
                        alignment, alignment.chrom, length
                    );
                } else {
                    debug!("Clamped {} to length {}", alignment, length);
                }
            }
        }

        // without @SQ lengths nothing above bounds the alignment end
        if spans.last().is_some_and(|s| s.end > MAX_POSITION + 1) {
            return Err(SamWigError::SamParseError(format!(
                "alignment {} extends past position {}",
                alignment, MAX_POSITION
            )));
        }

        self.sink
            .add_alignment(&alignment.chrom, alignment.pos, &spans)?;
        self.stats.alignments += 1;
        Ok(())
    }

    /// Takes the events that became final, counting references and runs.
    pub fn drain_events(&mut self) -> Vec<TrackEvent> {
        let events = self.sink.drain_events();
        self.count_events(&events);
        events
    }

    /// Close the current reference so its remaining coverage can be drained.
    pub fn flush(&mut self) {
        if let CoverageSink::Depth(acc) = &self.sink {
            if let Some(chrom) = acc.current_chrom() {
                debug!(
                    "Closing {} with {} pending boundaries (peak {})",
                    chrom,
                    acc.window_len(),
                    acc.peak_window_len()
                );
            }
        }
        self.sink.flush();
    }

    /// Flushes the last reference, returns all un-drained events and the final counters.
    pub fn finish(mut self) -> (Vec<TrackEvent>, StreamStats) {
        self.flush();
        let events = self.drain_events();
        (events, self.stats)
    }

    fn count_events(&mut self, events: &[TrackEvent]) {
        for event in events {
            match event {
                TrackEvent::Begin { .. } => self.stats.references += 1,
                TrackEvent::Run(_) => self.stats.runs += 1,
                TrackEvent::End { .. } => {}
            }
        }
    }
}

/// Trim spans to a reference of `length` bases. Returns whether anything changed.
fn clamp_spans(spans: &mut Vec<Span>, length: u64) -> bool {
    let limit = length.saturating_add(1); // exclusive end of the last valid position
    let before = spans.clone();
    spans.retain(|s| s.start < limit);
    for span in spans.iter_mut() {
        span.end = span.end.min(limit);
    }
    *spans != before
}

// ──────────────────────────────────────────────
// Helpers for the streaming pipeline
// ──────────────────────────────────────────────

/// Iterate lines from a BufRead source and feed them to the processor,
/// draining output after every line to keep memory bounded.
fn process_lines<R: BufRead, W: Write>(
    mut reader: R,
    processor: &mut SamCoverageProcessor,
    track_writer: &mut TrackWriter,
    output: &mut W,
    progress: &ProgressBar,
) -> Result<()> {
    let mut line_buf = String::with_capacity(256);
    loop {
        line_buf.clear();
        let bytes_read = reader.read_line(&mut line_buf)?;
        if bytes_read == 0 {
            break;
        }
        processor.process_line(&line_buf)?;

        let events = processor.drain_events();
        if !events.is_empty() {
            track_writer.write_events(output, &events, processor.header())?;
        }

        if processor.stats().lines % PROGRESS_INTERVAL == 0 {
            progress.set_position(processor.stats().lines as u64);
        }
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Top-level entry points
// ──────────────────────────────────────────────

///
/// Run the streaming coverage pipeline.
/// Reads SAM text from `input` and writes the track to `output`.
/// Gzip compressed input is detected via magic number peek.
///
/// # Arguments
/// - input: SAM text, plain or gzip
/// - output: destination of the track, buffered internally
/// - config: track and policy settings
///
pub fn sam_to_wig<R: Read + 'static, W: Write>(
    input: R,
    output: &mut W,
    config: &CoverageConfig,
) -> Result<StreamStats> {
    sam_to_wig_with_progress(input, output, config, &ProgressBar::hidden())
}

/// Same as [sam_to_wig], reporting the number of lines read to `progress`.
pub fn sam_to_wig_with_progress<R: Read + 'static, W: Write>(
    input: R,
    output: &mut W,
    config: &CoverageConfig,
    progress: &ProgressBar,
) -> Result<StreamStats> {
    config.validate()?;

    let reader = get_dynamic_reader_from(input)?;
    let mut buf_output = io::BufWriter::with_capacity(IO_BUFFER_SIZE, output);

    let mut processor = SamCoverageProcessor::from_config(config);
    let mut track_writer = TrackWriter::new(config.format, config.window, config.fixed_value);

    write_track_line(
        &mut buf_output,
        config.format,
        &config.name,
        config.description.as_deref(),
    )?;

    process_lines(
        reader,
        &mut processor,
        &mut track_writer,
        &mut buf_output,
        progress,
    )?;

    // Finalize
    processor.flush();
    let events = processor.drain_events();
    if !events.is_empty() {
        track_writer.write_events(&mut buf_output, &events, processor.header())?;
    }
    buf_output.flush()?;

    let stats = processor.stats().clone();
    progress.set_position(stats.lines as u64);
    info!("Wrote {} track: {}", track_writer.format(), stats);
    Ok(stats)
}

// ──────────────────────────────────────────────
// Unit tests
// ──────────────────────────────────────────────
