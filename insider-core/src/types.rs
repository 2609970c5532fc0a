//! Core data model shared by every component: [`ReconEvent`], [`ExfilEvent`],
//! [`FileContext`], [`UserBaseline`], and [`Finding`], per spec §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The actor identity the correlator groups events by.
pub type Actor = String;

/// High-signal vs. low-signal recon actions, per spec §4.1's weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconAction {
    AskAboutThisFile,
    SummarizeFile,
    AnalyzeDocuments,
    CatchMeUp,
    ReportUnspecifiedFiles,
    HelpMeWrite,
    Proofread,
    SearchWeb,
}

impl ReconAction {
    /// Additive weight this action contributes to the actor's recon score.
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            ReconAction::AskAboutThisFile
            | ReconAction::SummarizeFile
            | ReconAction::AnalyzeDocuments
            | ReconAction::CatchMeUp
            | ReconAction::ReportUnspecifiedFiles => 2.0,
            ReconAction::HelpMeWrite | ReconAction::Proofread => 0.5,
            ReconAction::SearchWeb => 1.0,
        }
    }

    /// Whether this action names a specific file, or is file-agnostic
    /// (e.g. `catch_me_up`, `search_web`, `report_unspecified_files`).
    #[must_use]
    pub fn is_file_agnostic(self) -> bool {
        matches!(
            self,
            ReconAction::CatchMeUp | ReconAction::SearchWeb | ReconAction::ReportUnspecifiedFiles
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum App {
    Docs,
    Drive,
    Sheets,
    Slides,
    Gmail,
    Meet,
}

/// A single LLM-assistant activity-stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconEvent {
    pub event_id: String,
    pub actor: Actor,
    pub action: ReconAction,
    pub app: App,
    pub doc_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExfilEventType {
    ChangeVisibility,
    ChangeAcl,
    Download,
    Export,
    Copy,
    AddToFolder,
}

impl ExfilEventType {
    /// Whether this exfil type is in the high-severity set named in spec
    /// §4.6 (`change_visibility to external`, `change_acl adding external`,
    /// `export`, `download`). External-ness of visibility/ACL changes is
    /// determined by the caller from [`ExfilEvent::visibility`] /
    /// [`ExfilEvent::destination_acl`]; this only names the base type.
    #[must_use]
    pub fn is_high_risk_type(self) -> bool {
        matches!(
            self,
            ExfilEventType::ChangeVisibility
                | ExfilEventType::ChangeAcl
                | ExfilEventType::Export
                | ExfilEventType::Download
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Domain,
    PeopleWithLink,
    PublicOnTheWeb,
    SharedExternally,
}

impl Visibility {
    /// Whether this visibility level reaches outside the tenant.
    #[must_use]
    pub fn is_external(self) -> bool {
        matches!(
            self,
            Visibility::PeopleWithLink
                | Visibility::PublicOnTheWeb
                | Visibility::SharedExternally
        )
    }
}

/// A single file-service activity-stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExfilEvent {
    pub event_id: String,
    pub actor: Actor,
    pub event_type: ExfilEventType,
    pub doc_id: String,
    pub visibility: Option<Visibility>,
    pub new_value: Option<String>,
    pub old_value: Option<String>,
    pub destination_acl: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExfilEvent {
    /// Extracts the destination domain from `destination_acl`, if it looks
    /// like an email address or bare domain.
    #[must_use]
    pub fn destination_domain(&self) -> Option<String> {
        let raw = self.destination_acl.as_ref()?;
        let domain = raw.rsplit('@').next().unwrap_or(raw);
        if domain.is_empty() {
            None
        } else {
            Some(domain.to_ascii_lowercase())
        }
    }

    /// Whether this event reaches outside the tenant, combining
    /// `event_type`, `visibility`, and `destination_acl`.
    #[must_use]
    pub fn is_external_reach(&self) -> bool {
        match self.event_type {
            ExfilEventType::ChangeVisibility => {
                self.visibility.is_some_and(Visibility::is_external)
            }
            ExfilEventType::ChangeAcl => self.destination_domain().is_some(),
            ExfilEventType::Export | ExfilEventType::Download | ExfilEventType::Copy => true,
            ExfilEventType::AddToFolder => false,
        }
    }
}

/// Persisted per-actor cumulative recon score, per spec §3/§4.1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconScoreEntry {
    pub actor: Actor,
    pub score: f64,
    pub last_update_ts: DateTime<Utc>,
}

/// Coarse file sensitivity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
    Unknown,
}

/// File-context cache entry, per spec §3/§4.2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContext {
    pub doc_id: String,
    pub owner: Actor,
    pub labels: BTreeSet<String>,
    pub sensitivity: Sensitivity,
    pub shared_externally_before: bool,
    pub fetched_at: DateTime<Utc>,
}

impl FileContext {
    /// The synthetic context returned when the provider errors (spec §4.2):
    /// the engine must not fail a finding solely due to enrichment failure.
    #[must_use]
    pub fn unknown(doc_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            doc_id: doc_id.into(),
            owner: String::new(),
            labels: BTreeSet::new(),
            sensitivity: Sensitivity::Unknown,
            shared_externally_before: false,
            fetched_at: now,
        }
    }
}

/// Rolling per-actor baseline statistics, per spec §3/§4.3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBaseline {
    pub actor: Actor,
    pub known_external_domains: BTreeSet<String>,
    pub external_share_count: u64,
    pub total_share_count: u64,
    pub own_file_share_count: u64,
    pub last_update_ts: DateTime<Utc>,
    pub window_start_ts: DateTime<Utc>,
}

impl UserBaseline {
    /// `total_share_count < 5` ⇒ "insufficient history" (spec §4.3 cold-start).
    #[must_use]
    pub fn has_sufficient_history(&self) -> bool {
        self.total_share_count >= 5
    }

    /// Fraction of shares targeting files the actor owns.
    #[must_use]
    pub fn own_file_share_ratio(&self) -> f64 {
        if self.total_share_count == 0 {
            0.0
        } else {
            self.own_file_share_count as f64 / self.total_share_count as f64
        }
    }

    /// Shares-per-day over the tracked rolling window.
    #[must_use]
    pub fn external_share_frequency(&self) -> f64 {
        let days = (self.last_update_ts - self.window_start_ts)
            .num_seconds()
            .max(86_400) as f64
            / 86_400.0;
        self.external_share_count as f64 / days
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Lowercase wire name, matching the `rename_all = "lowercase"` tagging
    /// above — used to compare against `alerting.alert_on_severities` config
    /// strings without round-tripping through serde.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// One severity step up, clamped at `High`.
    #[must_use]
    pub fn step_up(self, steps: u8) -> Self {
        let rank = match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
        };
        match (rank + steps as i32).min(2) {
            0 => Severity::Low,
            1 => Severity::Medium,
            _ => Severity::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Malicious,
    Suspicious,
    Benign,
}

/// Output of the intent classifier, per spec §4.5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub intent: Intent,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub should_suppress: bool,
    pub destination_domain: Option<String>,
}

/// Event id pair referenced by a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventIds {
    pub recon: Option<String>,
    pub exfil: String,
}

/// The engine's output record, per spec §3/§6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub actor: Actor,
    pub exfil_event: ExfilEvent,
    pub recon_event: Option<ReconEvent>,
    pub delta_minutes: Option<f64>,
    pub recon_score: f64,
    pub file_context: FileContext,
    pub intent_analysis: IntentAnalysis,
    pub reason: String,
    pub event_ids: EventIds,
}
