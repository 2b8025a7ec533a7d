#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod bernoulli;
pub mod clusters;
pub mod config;
pub mod data;
pub mod memo;
pub mod optim;
pub mod scan;
pub mod scoring;
pub mod subset;
pub mod types;

pub use bernoulli::Bernoulli;
pub use scoring::{ScoreError, ScoringFunction};
pub use types::{CacheHits, Direction, QRange};
