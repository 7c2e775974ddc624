//! Text normalization and fact extraction for noisy diligence inputs.

pub mod facts;
pub mod normalize;
