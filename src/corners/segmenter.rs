use log::trace;

/// A contiguous run of samples whose signal stayed above a threshold.
///
/// `start` is the first sample above the threshold. `end` is the first
/// sample back at or below it, or the last sample of the input when the run
/// was still open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentState {
    OutOfSegment,
    InSegment { start: usize },
}

/// Two-state machine splitting a signal into segments above a threshold.
///
/// Feed it one value per sample with [`Segmenter::step`] and close any open
/// segment with [`Segmenter::finish`] once the input ends.
#[derive(Clone, Debug)]
pub struct Segmenter {
    threshold: f64,
    state: SegmentState,
}

impl Segmenter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: SegmentState::OutOfSegment,
        }
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// Advance with the signal at `index`, returning a segment when it closes.
    pub fn step(&mut self, index: usize, value: f64) -> Option<Segment> {
        match self.state {
            SegmentState::OutOfSegment if value > self.threshold => {
                trace!("Segment opened at sample {index}");
                self.state = SegmentState::InSegment { start: index };
                None
            }
            SegmentState::InSegment { start } if value <= self.threshold => {
                trace!("Segment {start}..={index} closed");
                self.state = SegmentState::OutOfSegment;
                Some(Segment { start, end: index })
            }
            _ => None,
        }
    }

    /// Close a segment still open at `last_index`, the final sample seen.
    pub fn finish(&mut self, last_index: usize) -> Option<Segment> {
        match std::mem::replace(&mut self.state, SegmentState::OutOfSegment) {
            SegmentState::InSegment { start } => Some(Segment {
                start,
                end: last_index,
            }),
            SegmentState::OutOfSegment => None,
        }
    }
}

/// Run a fresh [`Segmenter`] over a whole signal.
pub fn segments(values: impl IntoIterator<Item = f64>, threshold: f64) -> Vec<Segment> {
    let mut segmenter = Segmenter::new(threshold);
    let mut segments = Vec::new();
    let mut last_index = None;
    for (index, value) in values.into_iter().enumerate() {
        segments.extend(segmenter.step(index, value));
        last_index = Some(index);
    }
    if let Some(last_index) = last_index {
        segments.extend(segmenter.finish(last_index));
    }
    segments
}
