//! Cascaded low-pass smoothing of score vectors.

use anyhow::bail;

use crate::iter::zip_exact;

/// A cascade of first-order low-pass filters applied to a vector of per-label scores.
///
/// Each stage is an exponential filter over the full score vector. Stage 0 chases the raw
/// scores; every later stage chases the stage before it, reading the value that stage
/// produced *in the same frame*. Running the stages in series like this adds delay on top
/// of the smoothing, which suppresses single-frame spikes much more strongly than one
/// filter with the same factor would.
///
/// All state starts at zero, so scores ramp up from 0.0 over the first few frames.
pub struct LowPassCascade {
    factor: f32,
    width: usize,
    stages: Box<[Box<[f32]>]>,
}

impl LowPassCascade {
    /// Number of filter stages used by [`LowPassCascade::new`].
    pub const STAGES: usize = 3;
    /// Per-stage filter factor used by [`LowPassCascade::new`].
    pub const FACTOR: f32 = 0.4;

    /// Creates a cascade for score vectors of `width` entries, using the default
    /// stage count and factor.
    pub fn new(width: usize) -> Self {
        Self::with_params(width, Self::STAGES, Self::FACTOR)
    }

    /// Creates a cascade with explicit parameters.
    ///
    /// The parameters are fixed for the lifetime of the cascade.
    ///
    /// # Panics
    ///
    /// Panics if `stages` is zero or `factor` is not in between 0.0 and 1.0.
    pub fn with_params(width: usize, stages: usize, factor: f32) -> Self {
        assert!(stages >= 1);
        assert!(factor >= 0.0 && factor <= 1.0);
        Self {
            factor,
            width,
            stages: vec![vec![0.0; width].into_boxed_slice(); stages].into_boxed_slice(),
        }
    }

    /// Returns the score vector width this cascade was allocated for.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Smooths `scores` in place, advancing the filter state by one frame.
    ///
    /// On return, `scores` holds the output of the last stage. The values are smoothed
    /// raw scores; no normalization is applied.
    ///
    /// Passing a slice whose length differs from [`LowPassCascade::width`] is a
    /// configuration error and leaves the filter state untouched.
    pub fn apply(&mut self, scores: &mut [f32]) -> anyhow::Result<()> {
        if scores.len() != self.width {
            bail!(
                "score vector has {} entries, filter is allocated for {}",
                scores.len(),
                self.width
            );
        }

        let factor = self.factor;
        for i in 0..self.stages.len() {
            let (done, todo) = self.stages.split_at_mut(i);
            let stage = &mut todo[0];
            // Stage 0 reads the raw scores, stage i reads stage i-1's value from
            // *this* frame. The update order is what makes this a cascade.
            let input: &[f32] = match done.last() {
                Some(prev) => prev,
                None => scores,
            };
            for (cell, &value) in zip_exact(stage.iter_mut(), input.iter()) {
                *cell += factor * (value - *cell);
            }
        }

        let last = self.stages.last().expect("cascade has at least one stage");
        scores.copy_from_slice(last);
        Ok(())
    }

    /// Zeroes all filter stages, restoring the state just after construction.
    pub fn reset(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.fill(0.0);
        }
    }
}
