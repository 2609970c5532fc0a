//! # Insider Core
//!
//! Correlation and scoring engine for an insider-threat detector: joins an
//! LLM-assistant activity stream ("recon") with a file-service activity
//! stream ("exfil") per actor, maintains a decaying cumulative recon score,
//! enriches candidates with cached file context and rolling user baselines,
//! classifies intent with a deterministic rule-based scorer, and resolves a
//! final severity under override and suppression rules.
//!
//! ## Module Organization
//!
//! - [`types`]: the shared data model (`ReconEvent`, `ExfilEvent`,
//!   `FileContext`, `UserBaseline`, `Finding`, ...)
//! - [`config`]: the engine's configuration surface
//! - [`error`]: the engine's error type
//! - [`adapters`]: the event-ingest adapter boundary (external collaborator)
//! - [`recon_store`]: the Recon State Store trait, decay math, and an
//!   in-memory backend
//! - [`file_context`]: the File Context Provider and its bounded LRU cache
//! - [`baseline`]: the User Baseline Tracker
//! - [`correlator`]: the per-actor temporal join
//! - [`intent`]: the rule-based intent classifier
//! - [`severity`]: the severity rubric, override, and suppression rules
//! - [`emitter`]: final `Finding` assembly
//! - [`engine`]: the orchestrator tying every component together over a
//!   bounded worker pool

pub mod adapters;
pub mod baseline;
pub mod config;
pub mod correlator;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod file_context;
pub mod intent;
pub mod recon_store;
pub mod severity;
pub mod types;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use types::Finding;
