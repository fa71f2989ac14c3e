//! # hs-search
//!
//! Search space definitions and pluggable samplers for Hypersweep.
//!
//! The sampler is the "suggest next point, observe outcome" half of the
//! search backend: any conforming implementation can be substituted for the
//! built-in random, grid, and TPE-style samplers.

mod sampler;
mod space;

pub use sampler::{sampler_by_name, GridSampler, RandomSampler, Sampler, TpeSampler};
pub use space::{ParameterDef, ParameterKind, SearchSpace};
