//! Finding Emitter (spec §4.7): assembles the final [`Finding`] record with
//! truncated floats and stable field order (enforced by `Finding`'s derived
//! `Serialize`, whose field order matches the declaration order used here
//! and in spec §6).

use crate::correlator::Candidate;
use crate::types::{EventIds, FileContext, Finding, IntentAnalysis, Severity};

fn truncate2(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}

/// Builds the immutable [`Finding`] record for an accepted candidate.
#[must_use]
pub fn emit(
    candidate: Candidate,
    severity: Severity,
    reason: String,
    file_context: FileContext,
    intent_analysis: IntentAnalysis,
) -> Finding {
    let event_ids = EventIds {
        recon: candidate.recon_event.as_ref().map(|r| r.event_id.clone()),
        exfil: candidate.exfil_event.event_id.clone(),
    };

    Finding {
        severity,
        actor: candidate.actor,
        exfil_event: candidate.exfil_event,
        recon_event: candidate.recon_event,
        delta_minutes: candidate.delta_minutes.map(truncate2),
        recon_score: truncate2(candidate.recon_score),
        file_context,
        intent_analysis,
        reason,
        event_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_to_two_decimals_without_rounding() {
        assert_eq!(truncate2(5.5555), 5.55);
        assert_eq!(truncate2(0.0), 0.0);
    }
}
