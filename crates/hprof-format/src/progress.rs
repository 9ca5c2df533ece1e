/// Pipeline phase a progress report refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Raw record decoding; measured in bytes consumed.
    Decode,
    /// Heap graph resolution; measured in items resolved.
    Resolve,
}

/// Receives percentage updates. Called at most once per distinct percentage.
pub trait ProgressSink {
    fn progress(&mut self, stage: Stage, percent: u8);
}

/// Sink that ignores every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&mut self, _stage: Stage, _percent: u8) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(Stage, u8),
{
    fn progress(&mut self, stage: Stage, percent: u8) {
        self(stage, percent)
    }
}

/// Turns (done, total) counts into percentage callbacks, forwarding only when
/// the rounded-down percentage changes.
#[derive(Debug)]
pub struct ProgressTracker {
    stage: Stage,
    total: u64,
    last: Option<u8>,
}

impl ProgressTracker {
    pub fn new(stage: Stage, total: u64) -> Self {
        Self {
            stage,
            total,
            last: None,
        }
    }

    pub fn update(&mut self, done: u64, sink: &mut dyn ProgressSink) {
        if self.total == 0 {
            return;
        }
        let scaled = u128::from(done.min(self.total)) * 100 / u128::from(self.total);
        let pct = u8::try_from(scaled).unwrap_or(100);
        if self.last != Some(pct) {
            self.last = Some(pct);
            sink.progress(self.stage, pct);
        }
    }

    pub fn finish(&mut self, sink: &mut dyn ProgressSink) {
        let total = self.total;
        self.update(total, sink);
    }
}
