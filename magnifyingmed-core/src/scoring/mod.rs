//! Under-Explored Bias Score computation.
//!
//! `components` maps one analysis's findings to six per-dimension badness
//! scores; `aggregator` combines them with validated weights, ranks the
//! drivers, and assigns a confidence label.

pub mod aggregator;
pub mod components;

pub use aggregator::{
    BiasAggregator, Confidence, DEFAULT_THRESHOLD, Driver, ScoreResult, ScoreWeights, Severity,
    WEIGHT_TOLERANCE,
};
pub use components::{ComponentScorer, Dimension, GeographicDiversity, RepresentationBasis};
