//! The Correlator (spec §4.4): the structural heart of the engine. Joins
//! recon and exfil events per actor over a sliding window, falling back to
//! the Recon State Store for delayed matches.

use crate::baseline::UserBaselineTracker;
use crate::recon_store::{current_score, observe_recon, ReconStateStore};
use crate::types::{Actor, ExfilEvent, ReconEvent};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A recon-to-exfil join candidate, handed to the Intent Classifier next.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub actor: Actor,
    pub exfil_event: ExfilEvent,
    pub recon_event: Option<ReconEvent>,
    pub delta_minutes: Option<f64>,
    pub recon_score: f64,
}

/// Clamps events with a timestamp beyond `now + tolerance` back to `now`
/// (spec §4.4 clock-skew edge case).
fn clamp_future(ts: DateTime<Utc>, now: DateTime<Utc>, tolerance: Duration) -> DateTime<Utc> {
    if ts > now + tolerance {
        now
    } else {
        ts
    }
}

fn dedup_recon(events: Vec<ReconEvent>) -> Vec<ReconEvent> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(e.event_id.clone()))
        .collect()
}

fn dedup_exfil(events: Vec<ExfilEvent>) -> Vec<ExfilEvent> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(e.event_id.clone()))
        .collect()
}

fn group_by_actor<T, F: Fn(&T) -> &Actor>(events: Vec<T>, actor_of: F) -> HashMap<Actor, Vec<T>> {
    let mut grouped: HashMap<Actor, Vec<T>> = HashMap::new();
    for event in events {
        grouped.entry(actor_of(&event).clone()).or_default().push(event);
    }
    grouped
}

/// Finds the best immediate-match recon event for `exfil` among `recon`
/// (already sorted ascending by timestamp), per spec §4.4(i): prefer
/// same-doc, fall through to file-agnostic recon, tie-break by most recent.
fn find_immediate_match<'a>(
    recon: &'a [ReconEvent],
    exfil: &ExfilEvent,
    window: Duration,
) -> Option<&'a ReconEvent> {
    let eligible: Vec<&ReconEvent> = recon
        .iter()
        .filter(|r| {
            let delta = exfil.timestamp - r.timestamp;
            delta >= Duration::zero() && delta <= window
        })
        .filter(|r| r.doc_id.is_none() || r.doc_id.as_deref() == Some(exfil.doc_id.as_str()))
        .collect();

    let same_doc = eligible
        .iter()
        .filter(|r| r.doc_id.as_deref() == Some(exfil.doc_id.as_str()))
        .max_by_key(|r| r.timestamp);
    same_doc.or_else(|| eligible.iter().max_by_key(|r| r.timestamp)).copied()
}

/// Correlates one actor's recon/exfil groups (already sorted ascending by
/// timestamp). This is the unit of work spec §5 allows to run concurrently
/// across actors; within an actor, recon ingestion and exfil correlation
/// stay sequential to preserve score-update ordering.
pub async fn correlate_actor(
    recon_store: &dyn ReconStateStore,
    baseline_tracker: &UserBaselineTracker,
    actor: &Actor,
    recon: Vec<ReconEvent>,
    exfil: Vec<ExfilEvent>,
    window: Duration,
    delayed_threshold: f64,
    recon_half_life_hours: f64,
) -> Vec<Candidate> {
    for r in &recon {
        observe_recon(recon_store, actor, r.action, r.timestamp, recon_half_life_hours).await;
    }

    let mut candidates = Vec::new();
    for e in exfil {
        let immediate = find_immediate_match(&recon, &e, window);
        if let Some(r) = immediate {
            let delta_minutes = (e.timestamp - r.timestamp).num_milliseconds() as f64 / 60_000.0;
            let score = current_score(recon_store, actor, e.timestamp, recon_half_life_hours).await;
            debug!(%actor, exfil_id = %e.event_id, recon_id = %r.event_id, delta_minutes, "immediate match");
            candidates.push(Candidate {
                actor: actor.clone(),
                exfil_event: e.clone(),
                recon_event: Some(r.clone()),
                delta_minutes: Some(delta_minutes),
                recon_score: score,
            });
        } else {
            let score = current_score(recon_store, actor, e.timestamp, recon_half_life_hours).await;
            if score >= delayed_threshold {
                debug!(%actor, exfil_id = %e.event_id, score, "delayed match");
                candidates.push(Candidate {
                    actor: actor.clone(),
                    exfil_event: e.clone(),
                    recon_event: None,
                    delta_minutes: None,
                    recon_score: score,
                });
            }
        }

        baseline_tracker.record(&e).await;
    }

    candidates
}

/// Groups and deduplicates a raw batch into per-actor, timestamp-sorted,
/// clock-skew-clamped recon/exfil groups, ready for [`correlate_actor`].
#[must_use]
pub fn prepare_batch(
    recon_events: Vec<ReconEvent>,
    exfil_events: Vec<ExfilEvent>,
    clock_skew_tolerance: Duration,
    now: DateTime<Utc>,
) -> (HashMap<Actor, Vec<ReconEvent>>, HashMap<Actor, Vec<ExfilEvent>>) {
    let recon_events = dedup_recon(recon_events)
        .into_iter()
        .map(|mut e| {
            e.timestamp = clamp_future(e.timestamp, now, clock_skew_tolerance);
            e
        })
        .collect::<Vec<_>>();
    let exfil_events = dedup_exfil(exfil_events)
        .into_iter()
        .map(|mut e| {
            e.timestamp = clamp_future(e.timestamp, now, clock_skew_tolerance);
            e
        })
        .collect::<Vec<_>>();

    let mut recon_by_actor = group_by_actor(recon_events, |e| &e.actor);
    for group in recon_by_actor.values_mut() {
        group.sort_by_key(|e| e.timestamp);
    }
    let mut exfil_by_actor = group_by_actor(exfil_events, |e| &e.actor);
    for group in exfil_by_actor.values_mut() {
        group.sort_by_key(|e| e.timestamp);
    }
    (recon_by_actor, exfil_by_actor)
}

/// Runs one correlation batch sequentially, actor by actor. Used directly by
/// tests; [`crate::engine::Engine`] drives the bounded-concurrency version
/// of the same per-actor unit of work for production batches.
pub async fn correlate(
    recon_store: &dyn ReconStateStore,
    baseline_tracker: &UserBaselineTracker,
    recon_events: Vec<ReconEvent>,
    exfil_events: Vec<ExfilEvent>,
    window_minutes: i64,
    delayed_threshold: f64,
    recon_half_life_hours: f64,
    clock_skew_tolerance: Duration,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let (mut recon_by_actor, mut exfil_by_actor) =
        prepare_batch(recon_events, exfil_events, clock_skew_tolerance, now);

    let mut actors: Vec<Actor> = recon_by_actor.keys().chain(exfil_by_actor.keys()).cloned().collect();
    actors.sort();
    actors.dedup();

    let window = Duration::minutes(window_minutes);
    let mut candidates = Vec::new();

    for actor in actors {
        let recon = recon_by_actor.remove(&actor).unwrap_or_default();
        let exfil = exfil_by_actor.remove(&actor).unwrap_or_default();
        candidates.extend(
            correlate_actor(
                recon_store,
                baseline_tracker,
                &actor,
                recon,
                exfil,
                window,
                delayed_threshold,
                recon_half_life_hours,
            )
            .await,
        );
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recon_store::InMemoryReconStateStore;
    use crate::types::{App, ExfilEventType, ReconAction, Visibility};

    fn recon(actor: &str, action: ReconAction, doc_id: Option<&str>, ts: DateTime<Utc>) -> ReconEvent {
        ReconEvent {
            event_id: format!("r-{}-{}", actor, ts.timestamp()),
            actor: actor.into(),
            action,
            app: App::Docs,
            doc_id: doc_id.map(str::to_string),
            timestamp: ts,
        }
    }

    fn exfil(actor: &str, doc_id: &str, ts: DateTime<Utc>) -> ExfilEvent {
        ExfilEvent {
            event_id: format!("e-{}-{}", actor, ts.timestamp()),
            actor: actor.into(),
            event_type: ExfilEventType::ChangeVisibility,
            doc_id: doc_id.into(),
            visibility: Some(Visibility::PeopleWithLink),
            new_value: None,
            old_value: None,
            destination_acl: None,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn immediate_match_within_window() {
        let store = InMemoryReconStateStore::new();
        let baseline = UserBaselineTracker::in_memory();
        let now = Utc::now();
        let r = recon("u@x.com", ReconAction::SummarizeFile, Some("D1"), now);
        let e = exfil("u@x.com", "D1", now + Duration::minutes(5));

        let candidates = correlate(
            &store,
            &baseline,
            vec![r.clone()],
            vec![e.clone()],
            30,
            5.0,
            48.0,
            Duration::minutes(5),
            now + Duration::minutes(10),
        )
        .await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].recon_event.as_ref().unwrap().event_id, r.event_id);
        assert!((candidates[0].delta_minutes.unwrap() - 5.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn boundary_exactly_at_window_is_included() {
        let store = InMemoryReconStateStore::new();
        let baseline = UserBaselineTracker::in_memory();
        let now = Utc::now();
        let r = recon("u@x.com", ReconAction::SummarizeFile, Some("D1"), now);
        let e = exfil("u@x.com", "D1", now + Duration::minutes(30));

        let candidates = correlate(
            &store,
            &baseline,
            vec![r],
            vec![e],
            30,
            5.0,
            48.0,
            Duration::minutes(5),
            now + Duration::hours(1),
        )
        .await;
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].recon_event.is_some());
    }

    #[tokio::test]
    async fn boundary_one_second_past_window_is_excluded() {
        let store = InMemoryReconStateStore::new();
        let baseline = UserBaselineTracker::in_memory();
        let now = Utc::now();
        let r = recon("u@x.com", ReconAction::SummarizeFile, Some("D1"), now);
        let e = exfil("u@x.com", "D1", now + Duration::minutes(30) + Duration::seconds(1));

        let candidates = correlate(
            &store,
            &baseline,
            vec![r],
            vec![e],
            30,
            5.0,
            48.0,
            Duration::minutes(5),
            now + Duration::hours(1),
        )
        .await;
        assert!(candidates.is_empty() || candidates[0].recon_event.is_none());
    }

    #[tokio::test]
    async fn duplicate_exfil_event_id_yields_one_candidate() {
        let store = InMemoryReconStateStore::new();
        let baseline = UserBaselineTracker::in_memory();
        let now = Utc::now();
        let r = recon("u@x.com", ReconAction::SummarizeFile, Some("D1"), now);
        let mut e1 = exfil("u@x.com", "D1", now + Duration::minutes(5));
        e1.event_id = "dup-1".to_string();
        let mut e2 = e1.clone();
        e2.visibility = Some(Visibility::PublicOnTheWeb);

        let candidates = correlate(
            &store,
            &baseline,
            vec![r],
            vec![e1, e2],
            30,
            5.0,
            48.0,
            Duration::minutes(5),
            now + Duration::hours(1),
        )
        .await;
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn no_recon_no_persistent_score_yields_nothing() {
        let store = InMemoryReconStateStore::new();
        let baseline = UserBaselineTracker::in_memory();
        let now = Utc::now();
        let e = exfil("u@x.com", "D1", now);

        let candidates = correlate(
            &store, &baseline, vec![], vec![e], 30, 5.0, 48.0, Duration::minutes(5), now,
        )
        .await;
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn file_agnostic_recon_matches_any_doc() {
        let store = InMemoryReconStateStore::new();
        let baseline = UserBaselineTracker::in_memory();
        let now = Utc::now();
        let r = recon("u@x.com", ReconAction::CatchMeUp, None, now);
        let e = exfil("u@x.com", "D1", now + Duration::minutes(3));

        let candidates = correlate(
            &store,
            &baseline,
            vec![r],
            vec![e],
            30,
            5.0,
            48.0,
            Duration::minutes(5),
            now + Duration::hours(1),
        )
        .await;
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].recon_event.is_some());
    }
}
