//! Finding serialization and the alert sink boundary (spec §6's alerting
//! webhook dispatcher, out of scope beyond this reference implementation)
//! plus the finding-file output the engine must always produce (spec §7).

use async_trait::async_trait;
use insider_core::types::{Finding, Severity};
use serde::Serialize;
use std::path::Path;

/// Stable-key-order JSON shape for one finding, matching spec §6 exactly.
#[derive(Serialize)]
struct FindingRecord<'a> {
    severity: Severity,
    actor: &'a str,
    exfil_event: &'a str,
    exfil_time: chrono::DateTime<chrono::FixedOffset>,
    doc_id: &'a str,
    doc_title: Option<&'a str>,
    recon_action: Option<insider_core::types::ReconAction>,
    recon_time: Option<chrono::DateTime<chrono::FixedOffset>>,
    delta_minutes: Option<f64>,
    visibility: Option<insider_core::types::Visibility>,
    reason: &'a str,
    event_ids: EventIdsRecord<'a>,
    recon_score: f64,
    file_context: FileContextRecord<'a>,
    intent_analysis: IntentRecord<'a>,
}

#[derive(Serialize)]
struct EventIdsRecord<'a> {
    recon: Option<&'a str>,
    exfil: &'a str,
}

#[derive(Serialize)]
struct FileContextRecord<'a> {
    sensitivity: insider_core::types::Sensitivity,
    labels: &'a std::collections::BTreeSet<String>,
    owner: &'a str,
    shared_externally_before: bool,
}

#[derive(Serialize)]
struct IntentRecord<'a> {
    intent: insider_core::types::Intent,
    confidence: f64,
    reasons: &'a [String],
    should_suppress: bool,
    destination_domain: Option<&'a str>,
}

fn to_record<'a>(finding: &'a Finding, tz: chrono_tz::Tz) -> FindingRecord<'a> {
    FindingRecord {
        severity: finding.severity,
        actor: &finding.actor,
        exfil_event: &finding.exfil_event.event_id,
        exfil_time: finding.exfil_event.timestamp.with_timezone(&tz).fixed_offset(),
        doc_id: &finding.exfil_event.doc_id,
        // The engine never fetches a human-readable title (spec §1: no
        // content inspection); the doc_id stands in as the title slot.
        doc_title: None,
        recon_action: finding.recon_event.as_ref().map(|r| r.action),
        recon_time: finding
            .recon_event
            .as_ref()
            .map(|r| r.timestamp.with_timezone(&tz).fixed_offset()),
        delta_minutes: finding.delta_minutes,
        visibility: finding.exfil_event.visibility,
        reason: &finding.reason,
        event_ids: EventIdsRecord {
            recon: finding.event_ids.recon.as_deref(),
            exfil: &finding.event_ids.exfil,
        },
        recon_score: finding.recon_score,
        file_context: FileContextRecord {
            sensitivity: finding.file_context.sensitivity,
            labels: &finding.file_context.labels,
            owner: &finding.file_context.owner,
            shared_externally_before: finding.file_context.shared_externally_before,
        },
        intent_analysis: IntentRecord {
            intent: finding.intent_analysis.intent,
            confidence: finding.intent_analysis.confidence,
            reasons: &finding.intent_analysis.reasons,
            should_suppress: finding.intent_analysis.should_suppress,
            destination_domain: finding.intent_analysis.destination_domain.as_deref(),
        },
    }
}

/// Renders findings as the stable-key-order JSON array from spec §6, with
/// timestamps rendered in `tz` rather than UTC (spec §4.7).
pub fn to_json(findings: &[Finding], tz: chrono_tz::Tz) -> anyhow::Result<String> {
    let records: Vec<_> = findings.iter().map(|f| to_record(f, tz)).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// The out-of-scope external collaborator dispatching alerts (spec §6).
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, findings: &[Finding]) -> anyhow::Result<()>;
}

/// Always writes the findings file the engine must produce (spec §7: "the
/// process always writes a findings file, possibly empty").
pub struct FileSink {
    path: std::path::PathBuf,
    timezone: chrono_tz::Tz,
}

impl FileSink {
    #[must_use]
    pub fn new(path: impl Into<std::path::PathBuf>, timezone: chrono_tz::Tz) -> Self {
        Self { path: path.into(), timezone }
    }
}

#[async_trait]
impl AlertSink for FileSink {
    async fn send(&self, findings: &[Finding]) -> anyhow::Result<()> {
        let json = to_json(findings, self.timezone)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// Best-effort HTTP POST of findings at or above the configured severities
/// (spec §6 `alerting.webhook_url`/`alert_on_severities`). A real dispatcher
/// would also handle auth and retries against the destination's SLA; this
/// is the reference shape only.
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
    timezone: chrono_tz::Tz,
    alert_on_severities: std::collections::BTreeSet<String>,
}

impl WebhookSink {
    #[must_use]
    pub fn new(
        url: String,
        timezone: chrono_tz::Tz,
        alert_on_severities: std::collections::BTreeSet<String>,
    ) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
            timezone,
            alert_on_severities,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn send(&self, findings: &[Finding]) -> anyhow::Result<()> {
        let alertable: Vec<&Finding> = findings
            .iter()
            .filter(|f| self.alert_on_severities.contains(f.severity.as_str()))
            .collect();
        if alertable.is_empty() {
            return Ok(());
        }
        let records: Vec<_> = alertable.iter().map(|f| to_record(f, self.timezone)).collect();
        self.client
            .post(&self.url)
            .json(&records)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Writes findings to an error-sibling file when emission fails twice, per
/// spec §7's `EmissionFailure` policy, then the caller exits with code 3.
pub fn dump_to_error_file(findings: &[Finding], original_path: &Path, tz: chrono_tz::Tz) -> anyhow::Result<()> {
    let error_path = original_path.with_extension("error.json");
    std::fs::write(&error_path, to_json(findings, tz)?)?;
    Ok(())
}
