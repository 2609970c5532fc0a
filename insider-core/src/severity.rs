//! Severity Resolver (spec §4.6): base severity rubric plus override and
//! suppression rules. Override-to-`high` wins over suppress, per spec §4.6
//! and the Open Question decision recorded in DESIGN.md.

use crate::config::EngineConfig;
use crate::correlator::Candidate;
use crate::types::{FileContext, IntentAnalysis, Sensitivity, Severity};

fn base_severity(candidate: &Candidate) -> Option<Severity> {
    let high_risk_type = candidate.exfil_event.event_type.is_high_risk_type()
        && candidate.exfil_event.is_external_reach();

    match candidate.delta_minutes {
        None => {
            // Delayed match.
            if high_risk_type {
                Some(Severity::Medium)
            } else {
                Some(Severity::Low)
            }
        }
        Some(delta) if delta <= 10.0 && high_risk_type => Some(Severity::High),
        Some(delta) if delta <= 30.0 && high_risk_type => Some(Severity::Medium),
        Some(_) => Some(Severity::Low),
    }
}

fn doc_parent_is_high_risk(doc_id: &str, high_risk_folders: &std::collections::BTreeSet<String>) -> bool {
    high_risk_folders.contains(doc_id)
}

/// Resolves the final severity for a candidate, or `None` if the finding
/// should be dropped (suppressed, or the actor/OU is excluded).
pub fn resolve(
    candidate: &Candidate,
    intent: &IntentAnalysis,
    file_context: &FileContext,
    actor_ou: Option<&str>,
    config: &EngineConfig,
) -> Option<(Severity, String)> {
    if config.suppressions.exclude_actors.contains(&candidate.actor) {
        return None;
    }
    if let Some(ou) = actor_ou {
        if config.suppressions.security_investigation_ous.contains(ou) {
            return None;
        }
    }

    let base = base_severity(candidate)?;

    let sensitive = file_context.sensitivity == Sensitivity::High
        || file_context
            .labels
            .iter()
            .any(|l| config.severity_overrides.sensitive_labels.contains(l));
    let high_risk_ou = actor_ou.is_some_and(|ou| config.severity_overrides.high_risk_ous.contains(ou));
    let high_risk_folder = doc_parent_is_high_risk(&candidate.exfil_event.doc_id, &config.high_risk_folders);

    let override_condition_count =
        u8::from(sensitive) + u8::from(high_risk_ou) + u8::from(high_risk_folder);
    let steps = match override_condition_count {
        0 => 0,
        1 => 1,
        _ => 2,
    };
    let severity = base.step_up(steps);

    // Suppression only yields to a severity that override conditions pushed
    // up to high; a high reached from the base rubric alone still drops.
    let elevated_to_high_by_override = steps > 0 && base != Severity::High && severity == Severity::High;
    if intent.should_suppress && !elevated_to_high_by_override {
        return None;
    }

    let reason = build_reason(candidate, intent, steps > 0);
    Some((severity, reason))
}

fn build_reason(candidate: &Candidate, intent: &IntentAnalysis, overridden: bool) -> String {
    let mut parts = Vec::new();
    match candidate.recon_event {
        Some(_) => parts.push(format!(
            "{} used the AI assistant on this file {:.2} minutes before the exfil act",
            candidate.actor,
            candidate.delta_minutes.unwrap_or(0.0),
        )),
        None => parts.push(format!(
            "delayed exfil after cumulative recon (score {:.2})",
            candidate.recon_score
        )),
    }
    if !intent.reasons.is_empty() {
        parts.push(intent.reasons.join(", "));
    }
    if overridden {
        parts.push("severity escalated by policy override".to_string());
    }
    parts.join("; ")
}
