//! Hand sign classification core.
//!
//! This crate turns per-frame hand landmark data into a stabilized, ranked
//! list of sign labels. Camera capture, rendering and the landmark detector
//! itself live outside of it: the detector is reached through the
//! [`hand::LandmarkSource`] trait, and the classifier model through the
//! [`classify::InferenceEngine`] trait (implemented for ONNX models by
//! [`nn::NeuralNetwork`]).
//!
//! A typical frame goes through [`classify::Classifier::classify_frame`]:
//! the previous frame's smoothed scores are ranked and rendered, then the
//! current frame is handed to the landmark source. If a hand is present, its
//! landmarks are flattened into a feature vector, run through the model, and
//! low-pass filtered into the score state that the *next* frame will report.
//!
//! # Environment Variables
//!
//! Logging is configured through the usual `RUST_LOG` variable once
//! [`init_logger!`] has been invoked.

use log::LevelFilter;

pub mod classify;
pub mod filter;
pub mod hand;
pub mod iter;
pub mod labels;
pub mod nn;
pub mod num;
pub mod rank;
pub mod timer;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `handsign` will log at *debug* level; everything
/// else stays at the `env_logger` default unless overridden via `RUST_LOG`.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
