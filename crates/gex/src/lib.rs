//! Gamma-exposure analytics.
//!
//! Raw option rows flow through [`exposure`] into a per-strike profile,
//! [`levels`] derives the flip, walls and regime, and [`combiner`] merges
//! several expiries into one ranked level set.

pub mod chain;
pub mod combiner;
pub mod exposure;
pub mod levels;
pub mod plan;

pub use chain::{build_snapshot, compute_chain, ChainRequest, ChainSnapshot, StrikeExposure};
pub use combiner::{
    CombinedWalls, CombinerSettings, ExpiryChain, ExpiryMode, StraddleLegs, WallCombiner, WallQuery,
};
pub use exposure::{
    aggregate_by_strike, compute_gex_rows, merge_aggregates, row_exposure, GammaExposureRow,
    StrikeAggregate,
};
pub use levels::{gamma_flip, nearest_levels, regime, top_walls, NearestLevels, Regime, Wall};
pub use plan::{plan_from_level, Bias, Plan, Setup};
