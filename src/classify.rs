//! Per-frame classification sessions.
//!
//! [`Classifier`] owns the label set, the inference engine and the low-pass filter state,
//! and orchestrates one camera frame end to end: rank the previous frame's smoothed
//! scores, query the landmark detector, run inference, smooth the fresh scores.

use std::fmt;
use std::mem;
use std::time::{Duration, Instant};

use anyhow::bail;

use crate::filter::cascade::LowPassCascade;
use crate::hand::{self, Detection, LandmarkSource};
use crate::labels::LabelSet;
use crate::rank::{self, RankedReport};
use crate::timer::Timer;

/// Number of ranked labels a frame report shows.
pub const RESULTS_TO_SHOW: usize = 3;

/// A classifier model, mapping a feature vector to one raw score per label.
///
/// The session treats the engine as an opaque synchronous function. The engine may
/// parallelize internally with a configurable number of worker threads, but the session
/// never calls it concurrently. [`crate::nn::NeuralNetwork`] implements this trait for
/// ONNX models.
pub trait InferenceEngine: Sized {
    /// Width of the feature vector the engine consumes.
    fn num_features(&self) -> usize;

    /// Number of per-label scores the engine produces.
    fn num_labels(&self) -> usize;

    /// Runs inference on `features`, writing one raw score per label into `scores`.
    fn infer(&self, features: &[f32], scores: &mut [f32]) -> anyhow::Result<()>;

    /// Tears this engine down and builds a replacement for the same model that uses
    /// `num_threads` internal worker threads.
    fn reconfigure(self, num_threads: usize) -> anyhow::Result<Self>;
}

enum EngineState<E> {
    Ready(E),
    /// The engine was torn down and could not be rebuilt. Classification reports a
    /// notice instead of running inference.
    Uninitialized,
    /// The session was closed; classification calls are rejected.
    Closed,
}

/// A classification session.
///
/// The session exclusively owns its filter state and engine handle. All per-frame methods
/// take `&mut self`, so at most one classification call can be active at a time.
pub struct Classifier<E: InferenceEngine, S: LandmarkSource> {
    labels: LabelSet,
    engine: EngineState<E>,
    source: S,
    filter: LowPassCascade,
    /// Smoothed per-label scores of the most recent classified frame.
    scores: Box<[f32]>,
    /// Scratch buffer for the flattened landmark features.
    features: Box<[f32]>,
    epoch: Instant,
    t_frame: Timer,
}

impl<E: InferenceEngine, S: LandmarkSource> Classifier<E, S> {
    /// Creates a session from a loaded engine, its label set, and a landmark source.
    ///
    /// The label set must have exactly one entry per engine output, and the engine must
    /// consume [`hand::FEATURE_LEN`] feature values; anything else is a configuration
    /// error.
    pub fn new(engine: E, labels: LabelSet, source: S) -> anyhow::Result<Self> {
        if engine.num_labels() != labels.len() {
            bail!(
                "model produces {} scores, but the label set has {} entries",
                engine.num_labels(),
                labels.len()
            );
        }
        if engine.num_features() != hand::FEATURE_LEN {
            bail!(
                "model expects {} input values, hand landmarks produce {}",
                engine.num_features(),
                hand::FEATURE_LEN
            );
        }

        let width = labels.len();
        Ok(Self {
            labels,
            engine: EngineState::Ready(engine),
            source,
            filter: LowPassCascade::new(width),
            scores: vec![0.0; width].into_boxed_slice(),
            features: vec![0.0; hand::FEATURE_LEN].into_boxed_slice(),
            epoch: Instant::now(),
            t_frame: Timer::new("classify"),
        })
    }

    /// Classifies one camera frame.
    ///
    /// The returned report ranks the scores as of the *previous* classified frame:
    /// ranking happens before this frame's inference, so the displayed text trails the
    /// camera by one frame. This matches the frame-staggered behavior of the upstream
    /// detector and is kept on purpose.
    ///
    /// Frames without a detected hand leave the filter state untouched and return the
    /// ranked report as-is. Detector errors are logged and treated the same way; there is
    /// no retry.
    pub fn classify_frame(&mut self, frame: &S::Frame) -> anyhow::Result<FrameReport> {
        let _guard = self.t_frame.start();

        let ranking = rank::top_k(&self.labels, &self.scores, RESULTS_TO_SHOW);
        let mut report = FrameReport {
            ranking,
            inference_time: None,
            notice: None,
        };

        let engine = match &self.engine {
            EngineState::Ready(engine) => engine,
            EngineState::Uninitialized => {
                log::error!("classifier has not been initialized; frame skipped");
                report.notice = Some("Uninitialized Classifier.");
                return Ok(report);
            }
            EngineState::Closed => bail!("classify_frame called on a closed session"),
        };

        if let Err(e) = self.source.submit(frame, self.epoch.elapsed()) {
            log::warn!("landmark detector error: {e}; frame skipped");
            return Ok(report);
        }
        let hands = match self.source.latest() {
            Detection::NoHand => return Ok(report),
            Detection::Hands(hands) => hands,
        };
        let Some(landmarks) = hands.first() else {
            return Ok(report);
        };

        landmarks.write_features(&mut self.features)?;
        let start = Instant::now();
        engine.infer(&self.features, &mut self.scores)?;
        let inference_time = start.elapsed();
        log::debug!("inference took {} ms", inference_time.as_millis());

        // Smooth the fresh raw scores into the state the next frame will rank.
        self.filter.apply(&mut self.scores)?;

        report.inference_time = Some(inference_time);
        Ok(report)
    }

    /// Replaces the engine with one that uses `num_threads` internal worker threads.
    ///
    /// The old engine is torn down first. If rebuilding fails, the session is left
    /// without an engine and every classification call reports an uninitialized notice;
    /// the session has to be recreated to recover. Filter state is preserved across
    /// reconfiguration; call [`Classifier::reset`] to discard it as well.
    pub fn set_num_threads(&mut self, num_threads: usize) -> anyhow::Result<()> {
        match mem::replace(&mut self.engine, EngineState::Uninitialized) {
            EngineState::Ready(engine) => {
                let engine = engine.reconfigure(num_threads)?;
                self.engine = EngineState::Ready(engine);
                Ok(())
            }
            EngineState::Uninitialized => {
                bail!("cannot reconfigure a session whose engine failed to initialize")
            }
            EngineState::Closed => {
                self.engine = EngineState::Closed;
                bail!("cannot reconfigure a closed session")
            }
        }
    }

    /// Zeroes the filter cascade and the reported scores, as if freshly constructed.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.scores.fill(0.0);
    }

    /// Releases the inference engine.
    ///
    /// Closing is idempotent. After the first call, [`Classifier::classify_frame`]
    /// returns a configuration error.
    pub fn close(&mut self) {
        if !matches!(self.engine, EngineState::Closed) {
            // Dropping the previous state releases the engine exactly once.
            self.engine = EngineState::Closed;
            log::debug!("classification session closed");
        }
    }

    /// Smoothed scores of the most recent classified frame, index-aligned with the label
    /// set. This is what the next frame's report will rank.
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Timers measuring this session's per-frame cost.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_frame].into_iter()
    }
}

/// Result of classifying one frame.
///
/// The `{}` ([`std::fmt::Display`]) implementation renders the block a UI shows: the
/// ranked `label:  score` lines, then the inference duration in milliseconds, then any
/// status notice.
#[derive(Debug, Clone)]
pub struct FrameReport {
    ranking: RankedReport,
    inference_time: Option<Duration>,
    notice: Option<&'static str>,
}

impl FrameReport {
    /// The ranked labels as of the previous classified frame.
    pub fn ranking(&self) -> &RankedReport {
        &self.ranking
    }

    /// Time the inference engine took this frame, if a hand was classified.
    pub fn inference_time(&self) -> Option<Duration> {
        self.inference_time
    }

    /// Status notice, set when the engine was not ready for this frame.
    pub fn notice(&self) -> Option<&str> {
        self.notice
    }
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ranking)?;
        if let Some(time) = self.inference_time {
            writeln!(f, "{} ms", time.as_millis())?;
        }
        if let Some(notice) = self.notice {
            writeln!(f, "{notice}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use crate::hand::{HandLandmarks, FEATURE_LEN, NUM_LANDMARKS};

    use super::*;

    /// Engine that always produces the same raw scores.
    struct FixedEngine {
        features: usize,
        scores: Vec<f32>,
        fail_reconfigure: bool,
    }

    impl FixedEngine {
        fn new(scores: Vec<f32>) -> Self {
            Self {
                features: FEATURE_LEN,
                scores,
                fail_reconfigure: false,
            }
        }
    }

    impl InferenceEngine for FixedEngine {
        fn num_features(&self) -> usize {
            self.features
        }

        fn num_labels(&self) -> usize {
            self.scores.len()
        }

        fn infer(&self, _features: &[f32], scores: &mut [f32]) -> anyhow::Result<()> {
            scores.copy_from_slice(&self.scores);
            Ok(())
        }

        fn reconfigure(self, _num_threads: usize) -> anyhow::Result<Self> {
            if self.fail_reconfigure {
                bail!("rebuild failed");
            }
            Ok(self)
        }
    }

    /// Source that replays a scripted sequence of detection outcomes.
    struct ScriptedSource {
        outcomes: RefCell<VecDeque<Detection>>,
    }

    impl ScriptedSource {
        fn new(outcomes: impl IntoIterator<Item = Detection>) -> Self {
            Self {
                outcomes: RefCell::new(outcomes.into_iter().collect()),
            }
        }
    }

    impl LandmarkSource for ScriptedSource {
        type Frame = ();

        fn submit(&mut self, _frame: &(), _timestamp: Duration) -> anyhow::Result<()> {
            Ok(())
        }

        fn latest(&self) -> Detection {
            let mut outcomes = self.outcomes.borrow_mut();
            let outcome = outcomes.pop_front().unwrap_or(Detection::NoHand);
            if outcomes.is_empty() {
                outcomes.push_back(outcome.clone());
            }
            outcome
        }
    }

    fn hand() -> Detection {
        let points = [[0.5, 0.5, 0.0]; NUM_LANDMARKS];
        Detection::Hands(vec![HandLandmarks::from_points(&points).unwrap()])
    }

    fn session(
        scores: Vec<f32>,
        labels: &str,
        outcomes: impl IntoIterator<Item = Detection>,
    ) -> Classifier<FixedEngine, ScriptedSource> {
        Classifier::new(
            FixedEngine::new(scores),
            LabelSet::parse(labels),
            ScriptedSource::new(outcomes),
        )
        .unwrap()
    }

    #[test]
    fn report_trails_by_one_frame() {
        let mut classifier = session(vec![1.0, 0.0], "A,B", [hand()]);

        // The first report ranks the zeroed initial state even though a hand is present.
        let first = classifier.classify_frame(&()).unwrap();
        assert_eq!(first.ranking().to_string(), "A:  0.00\nB:  0.00\n");
        assert!(first.inference_time().is_some());

        // The second report shows the first frame's smoothed scores: one cascade step
        // moves a score from 0.0 towards 1.0 by 0.4^3.
        let second = classifier.classify_frame(&()).unwrap();
        assert_eq!(second.ranking().to_string(), "A:  0.06\nB:  0.00\n");
    }

    #[test]
    fn report_renders_time_and_ranking() {
        let mut classifier = session(vec![1.0, 0.0], "A,B", [hand()]);
        let report = classifier.classify_frame(&()).unwrap();
        let text = report.to_string();
        assert!(text.starts_with("A:  0.00\nB:  0.00\n"));
        assert!(text.trim_end().ends_with("ms"));
    }

    #[test]
    fn no_hand_leaves_filter_state_untouched() {
        let mut classifier = session(vec![1.0, 0.0], "A,B", [hand(), Detection::NoHand]);

        classifier.classify_frame(&()).unwrap();
        let after_hand: Vec<u32> = classifier.scores().iter().map(|s| s.to_bits()).collect();
        assert!(classifier.scores()[0] > 0.0);

        let report = classifier.classify_frame(&()).unwrap();
        assert!(report.inference_time().is_none());
        let after_skip: Vec<u32> = classifier.scores().iter().map(|s| s.to_bits()).collect();
        assert_eq!(after_hand, after_skip);
    }

    #[test]
    fn empty_hand_list_counts_as_no_hand() {
        let mut classifier = session(vec![1.0], "A", [Detection::Hands(Vec::new())]);
        let report = classifier.classify_frame(&()).unwrap();
        assert!(report.inference_time().is_none());
        assert_eq!(classifier.scores(), [0.0]);
    }

    #[test]
    fn smoothing_matches_a_standalone_cascade() {
        let mut classifier = session(vec![0.25, 1.5], "A,B", [hand()]);
        let mut reference = LowPassCascade::new(2);
        for _ in 0..10 {
            classifier.classify_frame(&()).unwrap();
            let mut expected = [0.25, 1.5];
            reference.apply(&mut expected).unwrap();
            assert_eq!(classifier.scores(), expected);
        }
    }

    #[test]
    fn close_is_idempotent_and_rejects_classification() {
        let mut classifier = session(vec![1.0], "A", [hand()]);
        classifier.close();
        classifier.close();
        assert!(classifier.classify_frame(&()).is_err());
        assert!(classifier.set_num_threads(2).is_err());
    }

    #[test]
    fn reconfiguration_preserves_filter_state() {
        let mut classifier = session(vec![1.0], "A", [hand()]);
        classifier.classify_frame(&()).unwrap();
        let before = classifier.scores()[0];
        assert!(before > 0.0);

        classifier.set_num_threads(4).unwrap();
        classifier.classify_frame(&()).unwrap();
        assert!(classifier.scores()[0] > before);
    }

    #[test]
    fn failed_reconfiguration_reports_uninitialized() {
        let mut engine = FixedEngine::new(vec![1.0]);
        engine.fail_reconfigure = true;
        let mut classifier = Classifier::new(
            engine,
            LabelSet::parse("A"),
            ScriptedSource::new([hand()]),
        )
        .unwrap();

        assert!(classifier.set_num_threads(4).is_err());
        let report = classifier.classify_frame(&()).unwrap();
        assert_eq!(report.notice(), Some("Uninitialized Classifier."));
        assert!(report.to_string().ends_with("Uninitialized Classifier.\n"));
        // The ranked block is still present ahead of the notice.
        assert!(report.to_string().starts_with("A:  0.00\n"));
    }

    #[test]
    fn reset_zeroes_scores_and_filter() {
        let mut classifier = session(vec![1.0], "A", [hand()]);
        classifier.classify_frame(&()).unwrap();
        classifier.classify_frame(&()).unwrap();
        classifier.reset();
        assert_eq!(classifier.scores(), [0.0]);

        // After a reset the cascade starts over from zero.
        classifier.classify_frame(&()).unwrap();
        let a = LowPassCascade::FACTOR;
        assert_eq!(classifier.scores(), [a * a * a]);
    }

    #[test]
    fn label_count_must_match_engine() {
        let result = Classifier::new(
            FixedEngine::new(vec![1.0, 2.0, 3.0]),
            LabelSet::parse("A,B"),
            ScriptedSource::new([Detection::NoHand]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn feature_width_must_match_engine() {
        let mut engine = FixedEngine::new(vec![1.0]);
        engine.features = 10;
        let result = Classifier::new(
            engine,
            LabelSet::parse("A"),
            ScriptedSource::new([Detection::NoHand]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_label_set_reports_nothing() {
        let mut classifier = session(Vec::new(), "", [Detection::NoHand]);
        let report = classifier.classify_frame(&()).unwrap();
        assert!(report.ranking().is_empty());
        assert_eq!(report.to_string(), "");
    }

    #[test]
    fn frame_timer_records() {
        let mut classifier = session(vec![1.0], "A", [hand()]);
        classifier.classify_frame(&()).unwrap();
        let timers: Vec<_> = classifier.timers().collect();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].samples(), 1);
    }
}
