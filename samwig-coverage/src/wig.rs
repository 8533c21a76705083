//! Track output formatting layered on top of [TrackEvent]s.

use std::fmt::{self, Display};
use std::io::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use samwig_core::errors::SamWigError;
use samwig_core::sam::SamHeader;

use crate::accumulator::{CoverageRun, TrackEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackFormat {
    /// variableStep wiggle, one line per run
    #[default]
    Variable,
    /// fixedStep wiggle, one value per window
    Fixed,
    #[serde(rename = "bedgraph")]
    BedGraph,
}

impl FromStr for TrackFormat {
    type Err = SamWigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "variable" | "variablestep" => Ok(TrackFormat::Variable),
            "fixed" | "fixedstep" => Ok(TrackFormat::Fixed),
            "bedgraph" => Ok(TrackFormat::BedGraph),
            _ => Err(SamWigError::Config(format!("Unknown track format: {}", s))),
        }
    }
}

impl Display for TrackFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackFormat::Variable => "variable",
            TrackFormat::Fixed => "fixed",
            TrackFormat::BedGraph => "bedgraph",
        };
        write!(f, "{}", name)
    }
}

/// What a fixedStep window reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedValue {
    /// mean depth over the window's bases
    #[default]
    Mean,
    /// number of alignments touching the window
    Reads,
}

impl FromStr for FixedValue {
    type Err = SamWigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(FixedValue::Mean),
            "reads" => Ok(FixedValue::Reads),
            _ => Err(SamWigError::Config(format!("Unknown fixedStep value: {}", s))),
        }
    }
}

impl Display for FixedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixedValue::Mean => write!(f, "mean"),
            FixedValue::Reads => write!(f, "reads"),
        }
    }
}

/// Write the `track` definition line that starts every output file.
pub fn write_track_line<W: Write>(
    writer: &mut W,
    format: TrackFormat,
    name: &str,
    description: Option<&str>,
) -> io::Result<()> {
    let track_type = match format {
        TrackFormat::BedGraph => "bedGraph",
        TrackFormat::Variable | TrackFormat::Fixed => "wiggle_0",
    };
    write!(writer, "track type={} name=\"{}\"", track_type, name)?;
    if let Some(description) = description {
        write!(writer, " description=\"{}\"", description)?;
    }
    writeln!(writer)
}

/// Stateful variableStep writer. A new declaration line is written whenever
/// the run length changes, since `span` is fixed per declaration.
#[derive(Debug, Default)]
pub struct VariableStepWriter {
    current_chrom: Option<String>,
    current_span: Option<u64>,
}

impl VariableStepWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_event<W: Write>(&mut self, writer: &mut W, event: &TrackEvent) -> io::Result<()> {
        match event {
            TrackEvent::Begin { chrom } => {
                self.current_chrom = Some(chrom.clone());
                self.current_span = None;
            }
            TrackEvent::Run(run) => {
                let chrom = self.current_chrom.as_deref().unwrap_or_default();
                if self.current_span != Some(run.len()) {
                    writeln!(writer, "variableStep chrom={} span={}", chrom, run.len())?;
                    self.current_span = Some(run.len());
                }
                writeln!(writer, "{} {}", run.start, run.depth)?;
            }
            TrackEvent::End { .. } => {
                self.current_chrom = None;
                self.current_span = None;
            }
        }
        Ok(())
    }
}

/// Stateful fixedStep writer over windows of `window` bases starting at
/// position 1, with uncovered windows written as 0.
///
/// With [FixedValue::Mean] runs are depth runs and each window holds their
/// mean. With [FixedValue::Reads] every run is one whole window carrying its
/// alignment count (see [WindowReadCounter](crate::windows::WindowReadCounter)).
#[derive(Debug)]
pub struct FixedStepWriter {
    window: u64,
    value: FixedValue,
    current_chrom: Option<String>,
    cursor: u64, // first position of the window being filled
    sum: u64,    // depth * bases accumulated for that window
    dirty: bool,
    header_written: bool,
}

impl FixedStepWriter {
    pub fn new(window: u64, value: FixedValue) -> Self {
        Self {
            window: window.max(1),
            value,
            current_chrom: None,
            cursor: 1,
            sum: 0,
            dirty: false,
            header_written: false,
        }
    }

    pub fn write_event<W: Write>(
        &mut self,
        writer: &mut W,
        event: &TrackEvent,
        chrom_size: Option<u64>,
    ) -> io::Result<()> {
        match event {
            TrackEvent::Begin { chrom } => {
                self.current_chrom = Some(chrom.clone());
                self.cursor = 1;
                self.sum = 0;
                self.dirty = false;
                self.header_written = false;
            }
            TrackEvent::Run(run) => match self.value {
                FixedValue::Mean => self.add_run(writer, run, chrom_size)?,
                FixedValue::Reads => self.add_window_count(writer, run, chrom_size)?,
            },
            TrackEvent::End { .. } => {
                if self.dirty {
                    self.write_window(writer, chrom_size)?;
                }
                // pad the remainder of a reference with a known length
                if let Some(size) = chrom_size {
                    while self.cursor <= size {
                        self.write_window(writer, chrom_size)?;
                    }
                }
                self.current_chrom = None;
            }
        }
        Ok(())
    }

    fn add_run<W: Write>(
        &mut self,
        writer: &mut W,
        run: &CoverageRun,
        chrom_size: Option<u64>,
    ) -> io::Result<()> {
        let mut pos = run.start;
        while pos < run.end {
            // Close every window that ends at or before pos
            while pos >= self.cursor + self.window {
                self.write_window(writer, chrom_size)?;
            }
            let chunk_end = run.end.min(self.cursor + self.window);
            self.sum += (chunk_end - pos) * u64::from(run.depth);
            self.dirty = true;
            pos = chunk_end;
        }
        Ok(())
    }

    fn add_window_count<W: Write>(
        &mut self,
        writer: &mut W,
        run: &CoverageRun,
        chrom_size: Option<u64>,
    ) -> io::Result<()> {
        while self.cursor < run.start {
            self.write_window(writer, chrom_size)?;
        }
        self.sum = u64::from(run.depth);
        self.dirty = true;
        Ok(())
    }

    fn write_window<W: Write>(&mut self, writer: &mut W, chrom_size: Option<u64>) -> io::Result<()> {
        if !self.header_written {
            writeln!(
                writer,
                "fixedStep chrom={} start=1 step={} span={}",
                self.current_chrom.as_deref().unwrap_or_default(),
                self.window,
                self.window
            )?;
            self.header_written = true;
        }

        match self.value {
            FixedValue::Mean => {
                // the last window of a reference may be shorter than the step
                let width = match chrom_size {
                    Some(size) if size >= self.cursor => self.window.min(size - self.cursor + 1),
                    _ => self.window,
                };
                writeln!(writer, "{}", format_mean(self.sum, width))?;
            }
            FixedValue::Reads => writeln!(writer, "{}", self.sum)?,
        }

        self.cursor += self.window;
        self.sum = 0;
        self.dirty = false;
        Ok(())
    }
}

fn format_mean(sum: u64, width: u64) -> String {
    if sum % width == 0 {
        (sum / width).to_string()
    } else {
        format!("{:.2}", sum as f64 / width as f64)
    }
}

/// bedGraph writer: 0-based, half-open `chrom start end depth` per run.
#[derive(Debug, Default)]
pub struct BedGraphWriter {
    current_chrom: Option<String>,
}

impl BedGraphWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_event<W: Write>(&mut self, writer: &mut W, event: &TrackEvent) -> io::Result<()> {
        match event {
            TrackEvent::Begin { chrom } => self.current_chrom = Some(chrom.clone()),
            TrackEvent::Run(run) => {
                writeln!(
                    writer,
                    "{}\t{}\t{}\t{}",
                    self.current_chrom.as_deref().unwrap_or_default(),
                    run.start - 1,
                    run.end - 1,
                    run.depth
                )?;
            }
            TrackEvent::End { .. } => self.current_chrom = None,
        }
        Ok(())
    }
}

/// Dispatch formatted output based on the configured format.
#[derive(Debug)]
pub enum TrackWriter {
    Variable(VariableStepWriter),
    Fixed(FixedStepWriter),
    BedGraph(BedGraphWriter),
}

impl TrackWriter {
    pub fn new(format: TrackFormat, window: u64, fixed_value: FixedValue) -> Self {
        match format {
            TrackFormat::Variable => TrackWriter::Variable(VariableStepWriter::new()),
            TrackFormat::Fixed => TrackWriter::Fixed(FixedStepWriter::new(window, fixed_value)),
            TrackFormat::BedGraph => TrackWriter::BedGraph(BedGraphWriter::new()),
        }
    }

    pub fn format(&self) -> TrackFormat {
        match self {
            TrackWriter::Variable(_) => TrackFormat::Variable,
            TrackWriter::Fixed(_) => TrackFormat::Fixed,
            TrackWriter::BedGraph(_) => TrackFormat::BedGraph,
        }
    }

    /// Write events, looking up reference lengths in `header` where the format needs them.
    pub fn write_events<W: Write>(
        &mut self,
        writer: &mut W,
        events: &[TrackEvent],
        header: &SamHeader,
    ) -> io::Result<()> {
        for event in events {
            match self {
                TrackWriter::Variable(w) => w.write_event(writer, event)?,
                TrackWriter::BedGraph(w) => w.write_event(writer, event)?,
                TrackWriter::Fixed(w) => {
                    let chrom_size = w
                        .current_chrom
                        .as_deref()
                        .or(match event {
                            TrackEvent::Begin { chrom } => Some(chrom.as_str()),
                            _ => None,
                        })
                        .and_then(|chrom| header.reference_length(chrom));
                    w.write_event(writer, event, chrom_size)?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn begin(chrom: &str) -> TrackEvent {
        TrackEvent::Begin {
            chrom: chrom.to_string(),
        }
    }

    fn end(chrom: &str) -> TrackEvent {
        TrackEvent::End {
            chrom: chrom.to_string(),
        }
    }

    fn run(start: u64, end: u64, depth: u32) -> TrackEvent {
        TrackEvent::Run(CoverageRun { start, end, depth })
    }

    fn render(format: TrackFormat, window: u64, events: &[TrackEvent], header: &SamHeader) -> String {
        let mut out = Vec::new();
        let mut writer = TrackWriter::new(format, window, FixedValue::Mean);
        writer.write_events(&mut out, events, header).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn example_events() -> Vec<TrackEvent> {
        vec![
            begin("chr1"),
            run(1, 3, 1),
            run(3, 6, 2),
            run(6, 8, 1),
            end("chr1"),
        ]
    }

    #[rstest]
    fn test_track_line() {
        let mut out = Vec::new();
        write_track_line(&mut out, TrackFormat::Variable, "Coverage", None).unwrap();
        write_track_line(&mut out, TrackFormat::BedGraph, "Kitty cat", Some("reads")).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "track type=wiggle_0 name=\"Coverage\"\n\
             track type=bedGraph name=\"Kitty cat\" description=\"reads\"\n"
        );
    }

    #[rstest]
    fn test_variable_step_output() {
        let output = render(TrackFormat::Variable, 1, &example_events(), &SamHeader::new());
        assert_eq!(
            output,
            "variableStep chrom=chr1 span=2\n\
             1 1\n\
             variableStep chrom=chr1 span=3\n\
             3 2\n\
             variableStep chrom=chr1 span=2\n\
             6 1\n"
        );
    }

    #[rstest]
    fn test_variable_step_reuses_declaration_for_equal_spans() {
        let events = vec![begin("chrX"), run(1, 5, 1), run(5, 9, 2), end("chrX"), begin("chrY"), run(1, 5, 1), end("chrY")];
        let output = render(TrackFormat::Variable, 1, &events, &SamHeader::new());
        assert_eq!(
            output,
            "variableStep chrom=chrX span=4\n\
             1 1\n\
             5 2\n\
             variableStep chrom=chrY span=4\n\
             1 1\n"
        );
    }

    #[rstest]
    fn test_bedgraph_output() {
        let output = render(TrackFormat::BedGraph, 1, &example_events(), &SamHeader::new());
        assert_eq!(output, "chr1\t0\t2\t1\nchr1\t2\t5\t2\nchr1\t5\t7\t1\n");
    }

    #[rstest]
    fn test_fixed_step_per_base() {
        let output = render(TrackFormat::Fixed, 1, &example_events(), &SamHeader::new());
        assert_eq!(
            output,
            "fixedStep chrom=chr1 start=1 step=1 span=1\n1\n1\n2\n2\n2\n1\n1\n"
        );
    }

    #[rstest]
    fn test_fixed_step_windows_and_padding() {
        let mut header = SamHeader::new();
        header.add_line("@SQ\tSN:chr1\tLN:10").unwrap();
        // windows of 4: [1,5) [5,9) [9,11)
        let output = render(TrackFormat::Fixed, 4, &example_events(), &header);
        // window 1: 1+1+2+2 = 6/4, window 2: 2+1+1 = 4/4, window 3 is padding
        assert_eq!(
            output,
            "fixedStep chrom=chr1 start=1 step=4 span=4\n1.50\n1\n0\n"
        );
    }

    #[rstest]
    fn test_fixed_step_zero_fills_leading_windows() {
        let events = vec![begin("chr2"), run(9, 11, 3), end("chr2")];
        let output = render(TrackFormat::Fixed, 4, &events, &SamHeader::new());
        assert_eq!(
            output,
            "fixedStep chrom=chr2 start=1 step=4 span=4\n0\n0\n1.50\n"
        );
    }

    #[rstest]
    fn test_fixed_step_reference_without_runs() {
        let mut header = SamHeader::new();
        header.add_line("@SQ\tSN:chr3\tLN:3").unwrap();
        let events = vec![begin("chr3"), end("chr3"), begin("chr4"), end("chr4")];
        let output = render(TrackFormat::Fixed, 2, &events, &header);
        // chr3 is padded to its length, chr4 has no known length and no data
        assert_eq!(output, "fixedStep chrom=chr3 start=1 step=2 span=2\n0\n0\n");
    }

    #[rstest]
    fn test_fixed_step_read_counts() {
        let mut header = SamHeader::new();
        header.add_line("@SQ\tSN:chr1\tLN:18").unwrap();
        // counts for windows [1,5) and [9,13), [5,9) untouched, [13,17) [17,19) padding
        let events = vec![begin("chr1"), run(1, 5, 2), run(9, 13, 1), end("chr1")];
        let mut out = Vec::new();
        let mut writer = TrackWriter::new(TrackFormat::Fixed, 4, FixedValue::Reads);
        writer.write_events(&mut out, &events, &header).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "fixedStep chrom=chr1 start=1 step=4 span=4\n2\n0\n1\n0\n0\n"
        );
    }

    #[rstest]
    #[case("mean", FixedValue::Mean)]
    #[case("Reads", FixedValue::Reads)]
    fn test_fixed_value_from_str(#[case] input: &str, #[case] expected: FixedValue) {
        assert_eq!(input.parse::<FixedValue>().unwrap(), expected);
        assert_eq!(expected.to_string().parse::<FixedValue>().unwrap(), expected);
        assert!("median".parse::<FixedValue>().is_err());
    }

    #[rstest]
    #[case("variable", TrackFormat::Variable)]
    #[case("fixedStep", TrackFormat::Fixed)]
    #[case("BedGraph", TrackFormat::BedGraph)]
    fn test_format_from_str(#[case] input: &str, #[case] expected: TrackFormat) {
        assert_eq!(input.parse::<TrackFormat>().unwrap(), expected);
        assert_eq!(expected.to_string().parse::<TrackFormat>().unwrap(), expected);
    }

    #[rstest]
    fn test_unknown_format() {
        assert!("bigwig".parse::<TrackFormat>().is_err());
    }
}
