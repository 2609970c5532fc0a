//! Intent Classifier (spec §4.5): merges destination reputation, user
//! baselines, ownership, and time-of-day into a deterministic, rule-based
//! verdict. Grounded on the teacher's additive-weight scoring pattern in
//! `reward::adaptive::calculator::AdaptiveRewardCalculator::calculate`.

use crate::config::IntentWeights;
use crate::correlator::Candidate;
use crate::types::{FileContext, Intent, IntentAnalysis, Sensitivity, UserBaseline};
use chrono::{DateTime, Weekday};
use chrono_tz::Tz as TzName;

/// Off-hours: local time before 07:00 or after 19:00, or a weekend.
fn is_off_hours(ts: DateTime<chrono::Utc>, tz: TzName) -> bool {
    let local = ts.with_timezone(&tz);
    use chrono::{Datelike, Timelike};
    let hour = local.hour();
    let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
    weekend || !(7..19).contains(&hour)
}

/// Classifies one correlation candidate, per spec §4.5's additive signal
/// table. Pure given its inputs.
#[allow(clippy::too_many_arguments)]
pub fn classify(
    candidate: &Candidate,
    file_context: &FileContext,
    baseline: Option<&UserBaseline>,
    weights: &IntentWeights,
    allowed_external_domains: &std::collections::BTreeSet<String>,
    partner_domains: &std::collections::BTreeSet<String>,
    timezone: TzName,
) -> IntentAnalysis {
    let mut score = weights.initial_score;
    let mut reasons = Vec::new();

    let destination_domain = candidate.exfil_event.destination_domain();

    if let Some(domain) = destination_domain.as_deref() {
        if allowed_external_domains.contains(domain) {
            score += weights.allowed_domain;
            reasons.push("trusted partner domain".to_string());
        } else if partner_domains.contains(domain) {
            score += weights.partner_domain;
        } else {
            let seen_before = baseline.is_some_and(|b| b.known_external_domains.contains(domain));
            if !seen_before {
                score += weights.first_time_destination;
                reasons.push(format!("first-time share with {domain}"));
            }
        }
    }

    let owns_file = !file_context.owner.is_empty() && file_context.owner == candidate.actor;
    if !owns_file && !file_context.owner.is_empty() {
        score += weights.non_owned_file;
        reasons.push("sharing someone else's file".to_string());
    }

    if is_off_hours(candidate.exfil_event.timestamp, timezone) {
        score += weights.off_hours;
        reasons.push("off-hours activity".to_string());
    }

    if candidate.recon_score >= weights.high_recon_score_threshold {
        score += weights.high_cumulative_recon;
        reasons.push("high cumulative recon".to_string());
    }

    if file_context.sensitivity == Sensitivity::High {
        score += weights.high_sensitivity;
    }

    if file_context.shared_externally_before {
        if let Some(domain) = destination_domain.as_deref() {
            if baseline.is_some_and(|b| b.known_external_domains.contains(domain)) {
                score += weights.repeat_same_destination;
            }
        }
    }

    let routine_sharer = baseline
        .map(|b| b.external_share_frequency() > weights.routine_sharer_frequency_per_day)
        .unwrap_or(false);
    if routine_sharer {
        score += weights.routine_sharer;
    }

    let score = score.clamp(0.0, 1.0);
    let intent = if score >= weights.malicious_threshold {
        Intent::Malicious
    } else if score >= weights.suspicious_threshold {
        Intent::Suspicious
    } else {
        Intent::Benign
    };
    let confidence = ((score - 0.5).abs() * 2.0).min(1.0);

    let routine_baseline = baseline
        .map(|b| b.has_sufficient_history() && routine_sharer)
        .unwrap_or(false);
    let should_suppress = intent == Intent::Benign
        && (destination_domain
            .as_deref()
            .is_some_and(|d| allowed_external_domains.contains(d))
            || routine_baseline);

    IntentAnalysis {
        intent,
        confidence,
        reasons,
        should_suppress,
        destination_domain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{App, ExfilEvent, ExfilEventType, ReconAction, ReconEvent, Visibility};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn candidate(delta_minutes: Option<f64>, recon_score: f64, destination: Option<&str>) -> Candidate {
        let now = Utc::now();
        Candidate {
            actor: "u@x.com".into(),
            exfil_event: ExfilEvent {
                event_id: "e1".into(),
                actor: "u@x.com".into(),
                event_type: ExfilEventType::ChangeVisibility,
                doc_id: "D1".into(),
                visibility: Some(Visibility::PeopleWithLink),
                new_value: None,
                old_value: None,
                destination_acl: destination.map(str::to_string),
                timestamp: now,
            },
            recon_event: Some(ReconEvent {
                event_id: "r1".into(),
                actor: "u@x.com".into(),
                action: ReconAction::SummarizeFile,
                app: App::Docs,
                doc_id: Some("D1".into()),
                timestamp: now,
            }),
            delta_minutes,
            recon_score,
        }
    }

    fn file_context(owner: &str, sensitivity: Sensitivity) -> FileContext {
        FileContext {
            doc_id: "D1".into(),
            owner: owner.into(),
            labels: BTreeSet::new(),
            sensitivity,
            shared_externally_before: false,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn allowlisted_domain_is_benign_and_suppressed() {
        let c = candidate(Some(5.0), 2.0, Some("user@partner.com"));
        let fc = file_context("u@x.com", Sensitivity::Low);
        let weights = IntentWeights::default();
        let allowed = BTreeSet::from(["partner.com".to_string()]);
        let analysis = classify(&c, &fc, None, &weights, &allowed, &BTreeSet::new(), TzName::UTC);
        assert_eq!(analysis.intent, Intent::Benign);
        assert!(analysis.should_suppress);
    }

    #[test]
    fn unknown_destination_and_high_recon_trends_malicious() {
        let c = candidate(Some(5.0), 20.0, Some("user@evil.example"));
        let fc = file_context("someone-else@x.com", Sensitivity::High);
        let weights = IntentWeights::default();
        let analysis = classify(
            &c,
            &fc,
            None,
            &weights,
            &BTreeSet::new(),
            &BTreeSet::new(),
            TzName::UTC,
        );
        assert_ne!(analysis.intent, Intent::Benign);
        assert!(!analysis.should_suppress);
    }
}
