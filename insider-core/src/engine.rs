//! The engine orchestrator: owns every dependency explicitly (spec §9's
//! re-architecture note replacing module-level singletons) and drives one
//! batch through correlation, classification, severity resolution, and
//! emission over a bounded per-actor worker pool (spec §5).

use crate::baseline::UserBaselineTracker;
use crate::config::EngineConfig;
use crate::correlator::{self, Candidate};
use crate::emitter;
use crate::file_context::{FileContextProvider, SensitivityConfig};
use crate::intent;
use crate::recon_store::ReconStateStore;
use crate::severity;
use crate::types::{Actor, ExfilEvent, Finding, ReconEvent};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The out-of-scope external collaborator resolving an actor's
/// organizational unit, used by severity overrides and suppressions. A
/// no-op implementation (`None` for every actor) is provided for hosts that
/// don't have a directory to consult.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn ou(&self, actor: &Actor) -> Option<String>;
}

pub struct NoDirectory;

#[async_trait]
impl ActorDirectory for NoDirectory {
    async fn ou(&self, _actor: &Actor) -> Option<String> {
        None
    }
}

/// Owns every dependency the correlation engine needs for one run.
pub struct Engine {
    config: EngineConfig,
    recon_store: Arc<dyn ReconStateStore>,
    file_context_provider: Arc<FileContextProvider>,
    baseline_tracker: Arc<UserBaselineTracker>,
    actor_directory: Arc<dyn ActorDirectory>,
    timezone: chrono_tz::Tz,
}

impl Engine {
    /// Builds an engine from validated config and its backends. Fails with
    /// `Configuration` if `config` itself is invalid (spec §7: configuration
    /// errors abort before any fetch).
    pub fn new(
        config: EngineConfig,
        recon_store: Arc<dyn ReconStateStore>,
        file_context_provider: Arc<FileContextProvider>,
        baseline_tracker: Arc<UserBaselineTracker>,
        actor_directory: Arc<dyn ActorDirectory>,
    ) -> crate::error::Result<Self> {
        config.validate()?;
        let timezone = config
            .timezone
            .parse()
            .map_err(|_| crate::error::Error::Configuration(format!("invalid timezone: {}", config.timezone)))?;
        Ok(Self {
            config,
            recon_store,
            file_context_provider,
            baseline_tracker,
            actor_directory,
            timezone,
        })
    }

    /// Runs one batch over `recon_events`/`exfil_events`, returning findings
    /// in the order described by spec §4.4 (ascending `exfil.timestamp` per
    /// actor; cross-actor order unspecified). `cancel` is checked between
    /// actors so a cancellation mid-batch still emits partial findings
    /// (spec §5).
    pub async fn run_batch(
        &self,
        recon_events: Vec<ReconEvent>,
        exfil_events: Vec<ExfilEvent>,
        now: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> Vec<Finding> {
        let clock_skew_tolerance = Duration::seconds(self.config.clock_skew_tolerance_secs);
        let (recon_by_actor, exfil_by_actor) =
            correlator::prepare_batch(recon_events, exfil_events, clock_skew_tolerance, now);

        let mut actors: Vec<Actor> = recon_by_actor
            .keys()
            .chain(exfil_by_actor.keys())
            .cloned()
            .collect();
        actors.sort();
        actors.dedup();

        let window = Duration::minutes(self.config.window_minutes);
        let concurrency = num_cpus().clamp(1, 8);

        let recon_store = self.recon_store.clone();
        let baseline_tracker = self.baseline_tracker.clone();
        let delayed_threshold = self.config.delayed_threshold;
        let half_life = self.config.recon_half_life_hours;

        let mut recon_by_actor = recon_by_actor;
        let mut exfil_by_actor = exfil_by_actor;
        let work: Vec<(Actor, Vec<ReconEvent>, Vec<ExfilEvent>)> = actors
            .into_iter()
            .map(|actor| {
                let recon = recon_by_actor.remove(&actor).unwrap_or_default();
                let exfil = exfil_by_actor.remove(&actor).unwrap_or_default();
                (actor, recon, exfil)
            })
            .collect();

        let candidate_groups: Vec<Vec<Candidate>> = stream::iter(work)
            .map(|(actor, recon, exfil)| {
                let recon_store = recon_store.clone();
                let baseline_tracker = baseline_tracker.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return Vec::new();
                    }
                    correlator::correlate_actor(
                        recon_store.as_ref(),
                        baseline_tracker.as_ref(),
                        &actor,
                        recon,
                        exfil,
                        window,
                        delayed_threshold,
                        half_life,
                    )
                    .await
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut findings = Vec::new();
        for candidates in candidate_groups {
            for candidate in candidates {
                if let Some(finding) = self.evaluate_candidate(candidate).await {
                    findings.push(finding);
                }
            }
        }

        info!(count = findings.len(), "batch produced findings");
        findings
    }

    async fn evaluate_candidate(&self, candidate: Candidate) -> Option<Finding> {
        let sensitivity_config = SensitivityConfig {
            sensitive_labels: self.config.severity_overrides.sensitive_labels.clone(),
            high_risk_owners: self.config.high_risk_ous.clone(),
        };
        let file_context = self
            .file_context_provider
            .get(&candidate.exfil_event.doc_id, &sensitivity_config)
            .await;

        if !file_context.owner.is_empty() {
            self.baseline_tracker
                .record_ownership(&candidate.actor, file_context.owner == candidate.actor)
                .await;
        }

        let baseline = self.baseline_tracker.baseline(&candidate.actor).await;

        let analysis = intent::classify(
            &candidate,
            &file_context,
            baseline.as_ref(),
            &self.config.intent_weights,
            &self.config.suppressions.allowed_external_domains,
            &self.config.partner_domains,
            self.timezone,
        );

        let actor_ou = self.actor_directory.ou(&candidate.actor).await;
        let (sev, reason) = severity::resolve(
            &candidate,
            &analysis,
            &file_context,
            actor_ou.as_deref(),
            &self.config,
        )?;

        Some(emitter::emit(candidate, sev, reason, file_context, analysis))
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}
