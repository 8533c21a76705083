//! Sliding coverage accumulator - memory bounded by open alignments, not chromosome size.
//!
//! Every span contributes a `+1` at its start and a `-1` at its end to an ordered
//! map of pending deltas. Because alignments arrive sorted by start, every
//! position before the newest alignment start is final and can be emitted as
//! runs of constant depth.

use std::collections::{BTreeMap, HashSet};

use log::debug;

use samwig_core::errors::{Result, SamWigError};
use samwig_core::models::Span;

/// A maximal range [start, end) of 1-based positions sharing one depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageRun {
    pub start: u64,
    pub end: u64,
    pub depth: u32,
}

impl CoverageRun {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Output of the accumulator, consumed by the track writers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEvent {
    Begin { chrom: String },
    Run(CoverageRun),
    End { chrom: String },
}

#[derive(Clone, Debug, PartialEq)]
enum WindowState {
    Idle,
    Active { chrom: String },
}

pub struct CoverageAccumulator {
    state: WindowState,
    deltas: BTreeMap<u64, i64>, // absolute position -> pending depth change
    anchor: u64,                // positions before this are final
    depth: u32,                 // depth of the currently open run
    run_start: u64,
    min_depth: u32,
    completed: HashSet<String>,
    events: Vec<TrackEvent>,
    peak_window: usize,
}

impl Default for CoverageAccumulator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl CoverageAccumulator {
    /// Runs shallower than `min_depth` are dropped. Depth-0 runs are never emitted.
    pub fn new(min_depth: u32) -> Self {
        Self {
            state: WindowState::Idle,
            deltas: BTreeMap::new(),
            anchor: 0,
            depth: 0,
            run_start: 0,
            min_depth: min_depth.max(1),
            completed: HashSet::new(),
            events: Vec::new(),
            peak_window: 0,
        }
    }

    /// Name of the reference currently being accumulated
    pub fn current_chrom(&self) -> Option<&str> {
        match &self.state {
            WindowState::Active { chrom } => Some(chrom.as_str()),
            WindowState::Idle => None,
        }
    }

    /// Number of pending boundaries held in the window
    pub fn window_len(&self) -> usize {
        self.deltas.len()
    }

    /// Largest window seen so far
    pub fn peak_window_len(&self) -> usize {
        self.peak_window
    }

    ///
    /// Add all spans of one alignment.
    ///
    /// The window is anchored on `pos`, the alignment's leftmost position, so a
    /// leading `N` does not push the anchor past reads that start later.
    ///
    /// # Arguments
    /// - chrom: reference name of the alignment
    /// - pos: 1-based leftmost position (SAM POS), at or before the first span
    /// - spans: the alignment's spans in reference order, as produced by
    ///   [samwig_core::cigar::extract_spans]
    ///
    pub fn add_alignment(&mut self, chrom: &str, pos: u64, spans: &[Span]) -> Result<()> {
        if spans.iter().all(Span::is_empty) {
            return Ok(());
        }

        match &self.state {
            WindowState::Idle => {
                self.begin_reference(chrom, pos)?;
            }
            WindowState::Active { chrom: current } => {
                if current != chrom {
                    // check before flushing so a rejected record leaves no partial output behind
                    if self.completed.contains(chrom) {
                        return Err(SamWigError::InterleavedReference(chrom.to_string()));
                    }
                    self.flush();
                    self.begin_reference(chrom, pos)?;
                }
            }
        }

        if pos < self.anchor {
            return Err(SamWigError::OrderingViolation {
                chrom: chrom.to_string(),
                position: pos,
                anchor: self.anchor,
            });
        }

        // Emit everything before this alignment's start
        // (since input is sorted, no future alignment can affect these)
        self.advance_to(pos);

        for span in spans.iter().filter(|s| !s.is_empty()) {
            *self.deltas.entry(span.start).or_insert(0) += 1;
            *self.deltas.entry(span.end).or_insert(0) -= 1;
        }
        self.peak_window = self.peak_window.max(self.deltas.len());

        Ok(())
    }

    fn begin_reference(&mut self, chrom: &str, start: u64) -> Result<()> {
        if self.completed.contains(chrom) {
            return Err(SamWigError::InterleavedReference(chrom.to_string()));
        }
        debug!("Starting coverage window for {} at {}", chrom, start);
        self.state = WindowState::Active {
            chrom: chrom.to_string(),
        };
        self.anchor = start;
        self.run_start = start;
        self.depth = 0;
        self.events.push(TrackEvent::Begin {
            chrom: chrom.to_string(),
        });
        Ok(())
    }

    /// Apply every pending delta strictly before `target` and move the anchor there.
    fn advance_to(&mut self, target: u64) {
        while let Some(entry) = self.deltas.first_entry() {
            if *entry.key() >= target {
                break;
            }
            let (pos, delta) = entry.remove_entry();
            self.apply_delta(pos, delta);
        }
        self.anchor = self.anchor.max(target);
    }

    fn apply_delta(&mut self, pos: u64, delta: i64) {
        if delta == 0 {
            return;
        }
        let new_depth = i64::from(self.depth) + delta;
        debug_assert!(new_depth >= 0, "coverage depth went negative at {}", pos);
        let new_depth = u32::try_from(new_depth.max(0)).unwrap_or(u32::MAX);

        if new_depth != self.depth {
            self.close_run(pos);
            self.run_start = pos;
            self.depth = new_depth;
        }
    }

    fn close_run(&mut self, end: u64) {
        if self.depth >= self.min_depth && end > self.run_start {
            self.events.push(TrackEvent::Run(CoverageRun {
                start: self.run_start,
                end,
                depth: self.depth,
            }));
        }
    }

    /// Drain the current reference completely and return to idle.
    pub fn flush(&mut self) {
        let chrom = match &self.state {
            WindowState::Active { chrom } => chrom.clone(),
            WindowState::Idle => return,
        };

        while let Some((pos, delta)) = self.deltas.pop_first() {
            self.apply_delta(pos, delta);
        }
        debug_assert_eq!(self.depth, 0, "coverage for {} did not return to 0", chrom);

        debug!("Flushed coverage window for {}", chrom);
        self.events.push(TrackEvent::End {
            chrom: chrom.clone(),
        });
        self.completed.insert(chrom);
        self.reset_counting_state();
    }

    fn reset_counting_state(&mut self) {
        self.state = WindowState::Idle;
        self.deltas.clear();
        self.anchor = 0;
        self.depth = 0;
        self.run_start = 0;
    }

    /// Takes accumulated events for periodic flushing.
    pub fn drain_events(&mut self) -> Vec<TrackEvent> {
        std::mem::take(&mut self.events)
    }

    /// Flushes the last reference, returns all un-drained events. Consumes self.
    pub fn finish(mut self) -> Vec<TrackEvent> {
        self.flush();
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;
    use samwig_core::cigar::extract_spans;

    fn run(start: u64, end: u64, depth: u32) -> CoverageRun {
        CoverageRun { start, end, depth }
    }

    /// Helper: feed (chrom, pos, cigar) alignments, return every event
    fn accumulate(alignments: &[(&str, u64, &str)], min_depth: u32) -> Vec<TrackEvent> {
        let mut acc = CoverageAccumulator::new(min_depth);
        let mut events = Vec::new();
        for (chrom, pos, cigar) in alignments {
            let spans = extract_spans(*pos, cigar).unwrap();
            acc.add_alignment(chrom, *pos, &spans).unwrap();
            events.extend(acc.drain_events());
        }
        events.extend(acc.finish());
        events
    }

    fn runs_of(events: &[TrackEvent]) -> Vec<CoverageRun> {
        events
            .iter()
            .filter_map(|e| match e {
                TrackEvent::Run(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    /// Brute force depth per position, the reference model for the accumulator
    fn naive_depths(spans: &[Span]) -> BTreeMap<u64, u32> {
        let mut depths = BTreeMap::new();
        for span in spans {
            for pos in span.start..span.end {
                *depths.entry(pos).or_insert(0) += 1;
            }
        }
        depths
    }

    fn expand_runs(runs: &[CoverageRun]) -> BTreeMap<u64, u32> {
        let mut depths = BTreeMap::new();
        for r in runs {
            for pos in r.start..r.end {
                assert!(depths.insert(pos, r.depth).is_none(), "runs overlap at {}", pos);
            }
        }
        depths
    }

    #[rstest]
    fn test_two_overlapping_reads() {
        let events = accumulate(&[("chr1", 1, "5M"), ("chr1", 3, "5M")], 1);
        assert_eq!(
            events,
            vec![
                TrackEvent::Begin { chrom: "chr1".to_string() },
                TrackEvent::Run(run(1, 3, 1)),
                TrackEvent::Run(run(3, 6, 2)),
                TrackEvent::Run(run(6, 8, 1)),
                TrackEvent::End { chrom: "chr1".to_string() },
            ]
        );
    }

    #[rstest]
    fn test_insertion_does_not_add_coverage() {
        let events = accumulate(&[("chr1", 10, "3M2I4M")], 1);
        assert_eq!(runs_of(&events), vec![run(10, 17, 1)]);
    }

    #[rstest]
    fn test_abutting_reads_merge_into_one_run() {
        let events = accumulate(&[("chr1", 1, "5M"), ("chr1", 6, "5M")], 1);
        assert_eq!(runs_of(&events), vec![run(1, 11, 1)]);
    }

    #[rstest]
    fn test_gap_between_reads() {
        let events = accumulate(&[("chr1", 1, "5M"), ("chr1", 20, "5M")], 1);
        assert_eq!(runs_of(&events), vec![run(1, 6, 1), run(20, 25, 1)]);
    }

    #[rstest]
    fn test_spliced_read_leaves_a_gap() {
        let events = accumulate(&[("chr1", 100, "5M10N5M"), ("chr1", 103, "4M")], 1);
        assert_eq!(
            runs_of(&events),
            vec![run(100, 103, 1), run(103, 105, 2), run(105, 107, 1), run(115, 120, 1)]
        );
    }

    #[rstest]
    fn test_leading_skip_does_not_move_anchor_past_pos() {
        let events = accumulate(&[("chr1", 1, "5N5M"), ("chr1", 3, "4M")], 1);
        assert_eq!(
            runs_of(&events),
            vec![run(3, 6, 1), run(6, 7, 2), run(7, 11, 1)]
        );
    }

    #[rstest]
    fn test_runs_are_emitted_before_finish() {
        let mut acc = CoverageAccumulator::new(1);
        acc.add_alignment("chr1", 1, &[Span::new(1, 6)]).unwrap();
        acc.add_alignment("chr1", 100, &[Span::new(100, 110)]).unwrap();
        let events = acc.drain_events();
        assert_eq!(
            events,
            vec![
                TrackEvent::Begin { chrom: "chr1".to_string() },
                TrackEvent::Run(run(1, 6, 1)),
            ]
        );
        assert_eq!(acc.window_len(), 2);
    }

    #[rstest]
    fn test_reference_switch_resets_state() {
        let events = accumulate(
            &[
                ("chr1", 1, "10M"),
                ("chr1", 5, "10M"),
                ("chr2", 1, "3M"),
                ("chr3", 2, "2M"),
            ],
            1,
        );
        assert_eq!(
            events,
            vec![
                TrackEvent::Begin { chrom: "chr1".to_string() },
                TrackEvent::Run(run(1, 5, 1)),
                TrackEvent::Run(run(5, 11, 2)),
                TrackEvent::Run(run(11, 15, 1)),
                TrackEvent::End { chrom: "chr1".to_string() },
                TrackEvent::Begin { chrom: "chr2".to_string() },
                TrackEvent::Run(run(1, 4, 1)),
                TrackEvent::End { chrom: "chr2".to_string() },
                TrackEvent::Begin { chrom: "chr3".to_string() },
                TrackEvent::Run(run(2, 4, 1)),
                TrackEvent::End { chrom: "chr3".to_string() },
            ]
        );
    }

    #[rstest]
    fn test_new_reference_may_start_before_old_anchor() {
        let events = accumulate(&[("chr1", 500, "5M"), ("chr2", 1, "5M")], 1);
        assert_eq!(runs_of(&events), vec![run(500, 505, 1), run(1, 6, 1)]);
    }

    #[rstest]
    fn test_min_depth_suppresses_shallow_runs() {
        let events = accumulate(&[("chr1", 1, "5M"), ("chr1", 3, "5M")], 2);
        assert_eq!(runs_of(&events), vec![run(3, 6, 2)]);
    }

    #[rstest]
    fn test_unsorted_alignment_is_rejected() {
        let mut acc = CoverageAccumulator::new(1);
        acc.add_alignment("chr1", 100, &[Span::new(100, 110)]).unwrap();
        let err = acc.add_alignment("chr1", 50, &[Span::new(50, 60)]).unwrap_err();
        assert!(matches!(
            err,
            SamWigError::OrderingViolation { position: 50, anchor: 100, .. }
        ));
    }

    #[rstest]
    fn test_interleaved_reference_is_rejected() {
        let mut acc = CoverageAccumulator::new(1);
        acc.add_alignment("chr1", 1, &[Span::new(1, 10)]).unwrap();
        acc.add_alignment("chr2", 1, &[Span::new(1, 10)]).unwrap();
        acc.drain_events();

        let err = acc.add_alignment("chr1", 20, &[Span::new(20, 30)]).unwrap_err();
        assert!(matches!(err, SamWigError::InterleavedReference(ref c) if c == "chr1"));
        // chr2 was not flushed by the rejected record
        assert_eq!(acc.current_chrom(), Some("chr2"));
        assert!(acc.drain_events().is_empty());
    }

    #[rstest]
    fn test_alignment_without_spans_changes_nothing() {
        let mut acc = CoverageAccumulator::new(1);
        acc.add_alignment("chr1", 1, &[]).unwrap();
        assert_eq!(acc.current_chrom(), None);
        assert!(acc.finish().is_empty());
    }

    #[rstest]
    fn test_window_is_bounded_by_open_alignments() {
        let mut acc = CoverageAccumulator::new(1);
        for i in 0..10_000u64 {
            let start = 1 + i * 10;
            acc.add_alignment("chr1", start, &[Span::new(start, start + 25)]).unwrap();
            acc.drain_events();
        }
        // at most three reads overlap any position, so only a handful of boundaries are pending
        assert!(acc.peak_window_len() <= 8, "peak {}", acc.peak_window_len());
    }

    #[rstest]
    fn test_tied_starts_in_any_order_give_identical_runs() {
        let a = accumulate(
            &[("chr1", 5, "10M"), ("chr1", 5, "3M"), ("chr1", 5, "2M4N2M"), ("chr1", 9, "1M")],
            1,
        );
        let b = accumulate(
            &[("chr1", 5, "2M4N2M"), ("chr1", 5, "10M"), ("chr1", 5, "3M"), ("chr1", 9, "1M")],
            1,
        );
        assert_eq!(a, b);
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(42)]
    #[case(2024)]
    fn test_matches_brute_force_model(#[case] seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut spans: Vec<Span> = (0..200)
            .map(|_| {
                let start = rng.random_range(1..500u64);
                let len = rng.random_range(1..60u64);
                Span::new(start, start + len)
            })
            .collect();
        spans.sort();

        let mut acc = CoverageAccumulator::new(1);
        let mut events = Vec::new();
        for span in &spans {
            acc.add_alignment("chr1", span.start, &[*span]).unwrap();
            events.extend(acc.drain_events());
        }
        events.extend(acc.finish());
        let runs = runs_of(&events);

        assert_eq!(expand_runs(&runs), naive_depths(&spans));
        for r in &runs {
            assert!(r.depth > 0);
            assert!(!r.is_empty());
        }
        for pair in runs.windows(2) {
            assert!(pair[0].end <= pair[1].start);
            if pair[0].end == pair[1].start {
                assert_ne!(pair[0].depth, pair[1].depth, "adjacent runs share depth");
            }
        }
    }
}
