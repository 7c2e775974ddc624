//! Diligence scoring engine.
//!
//! Re-scores venture diligence records only when their inputs changed,
//! merges fresh model scores with analyst overrides, classifies thesis fit
//! from model output, and syncs results to HubSpot. Collaborators (storage,
//! link ingestion, the models, research, CRM) sit behind the traits in
//! [`provider`].

pub mod config;
pub mod criteria;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod hubspot;
pub mod logging;
pub mod merge;
pub mod narrative;
pub mod provider;
pub mod rescore;
pub mod text;
pub mod thesis;
pub mod types;

pub use config::{ConfigStore, DiligenceConfig, LoadedConfig};
pub use error::DiligenceError;
pub use rescore::{RescoreRequest, RescoreResponse, Rescorer};
