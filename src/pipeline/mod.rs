//! Evaluation pipeline: collaborator traits and the per-cycle runner.

mod cycle;
mod providers;

pub use cycle::{evaluate_cycle, run_cycle, CycleReport, PositionFailure};
pub use providers::{
    InMemoryPositions, OpenPositions, PositionStore, RateProvider, SignalLog, SignalSink, StaticRateFeed,
};
