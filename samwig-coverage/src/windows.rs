//! Per-window read counts for fixedStep tracks.
//!
//! Instead of depth, each window of `window` bases (starting at position 1)
//! reports how many alignments cover at least one of its bases. Counts live in
//! a sparse map keyed by window index, and windows before the newest alignment
//! start are emitted as soon as they can no longer change.

use std::collections::{BTreeMap, HashSet};

use log::debug;

use samwig_core::errors::{Result, SamWigError};
use samwig_core::models::Span;

use crate::accumulator::{CoverageRun, TrackEvent};

/// Counts alignments per fixed window. Emits one [TrackEvent::Run] per
/// non-empty window, spanning the whole window, with the count as its depth.
pub struct WindowReadCounter {
    current_chrom: Option<String>,
    window: u64,
    min_count: u32,
    counts: BTreeMap<u64, u32>, // window index -> alignments touching it
    anchor: u64,
    completed: HashSet<String>,
    events: Vec<TrackEvent>,
}

impl WindowReadCounter {
    /// Windows counting fewer than `min_count` alignments are left out.
    pub fn new(window: u64, min_count: u32) -> Self {
        Self {
            current_chrom: None,
            window: window.max(1),
            min_count: min_count.max(1),
            counts: BTreeMap::new(),
            anchor: 0,
            completed: HashSet::new(),
            events: Vec::new(),
        }
    }

    fn window_index(&self, pos: u64) -> u64 {
        (pos - 1) / self.window
    }

    ///
    /// Count one alignment in every window one of its spans touches.
    /// Windows lying entirely inside an `N` gap are not counted.
    ///
    pub fn add_alignment(&mut self, chrom: &str, pos: u64, spans: &[Span]) -> Result<()> {
        if spans.iter().all(Span::is_empty) {
            return Ok(());
        }

        match self.current_chrom.as_deref() {
            None => self.begin_reference(chrom, pos)?,
            Some(current) if current != chrom => {
                if self.completed.contains(chrom) {
                    return Err(SamWigError::InterleavedReference(chrom.to_string()));
                }
                self.flush();
                self.begin_reference(chrom, pos)?;
            }
            Some(_) => {}
        }

        if pos < self.anchor {
            return Err(SamWigError::OrderingViolation {
                chrom: chrom.to_string(),
                position: pos,
                anchor: self.anchor,
            });
        }
        self.anchor = pos;
        self.emit_before(self.window_index(pos));

        let mut last_counted: Option<u64> = None;
        for span in spans.iter().filter(|s| !s.is_empty()) {
            let first = match last_counted {
                Some(last) => self.window_index(span.start).max(last + 1),
                None => self.window_index(span.start),
            };
            let last = self.window_index(span.end - 1);
            for index in first..=last {
                let count = self.counts.entry(index).or_insert(0);
                *count = count.saturating_add(1);
            }
            last_counted = Some(last_counted.map_or(last, |l| l.max(last)));
        }

        Ok(())
    }

    fn begin_reference(&mut self, chrom: &str, pos: u64) -> Result<()> {
        if self.completed.contains(chrom) {
            return Err(SamWigError::InterleavedReference(chrom.to_string()));
        }
        debug!("Starting window counts for {} at {}", chrom, pos);
        self.current_chrom = Some(chrom.to_string());
        self.anchor = pos;
        self.events.push(TrackEvent::Begin {
            chrom: chrom.to_string(),
        });
        Ok(())
    }

    fn emit_before(&mut self, target: u64) {
        while let Some(entry) = self.counts.first_entry() {
            if *entry.key() >= target {
                break;
            }
            let (index, count) = entry.remove_entry();
            self.emit_window(index, count);
        }
    }

    fn emit_window(&mut self, index: u64, count: u32) {
        if count < self.min_count {
            return;
        }
        let start = index * self.window + 1;
        self.events.push(TrackEvent::Run(CoverageRun {
            start,
            end: start.saturating_add(self.window),
            depth: count,
        }));
    }

    /// Emit every remaining window of the current reference and return to idle.
    pub fn flush(&mut self) {
        let chrom = match self.current_chrom.take() {
            Some(chrom) => chrom,
            None => return,
        };
        self.emit_before(u64::MAX);
        debug!("Flushed window counts for {}", chrom);
        self.events.push(TrackEvent::End {
            chrom: chrom.clone(),
        });
        self.completed.insert(chrom);
        self.anchor = 0;
    }

    pub fn drain_events(&mut self) -> Vec<TrackEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn finish(mut self) -> Vec<TrackEvent> {
        self.flush();
        self.events
    }
}
