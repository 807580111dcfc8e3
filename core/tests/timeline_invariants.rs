//! Cross-artifact invariants checked over whole generated populations.
//!
//! Every seed must produce histories that are contiguous, timelines that
//! replay cleanly through the state machine, and DATA_DRIVEN events that
//! agree to the microsecond with the address and customer update tables.

use amlsynth_core::{
    engine::Dataset,
    status::StatusValue,
    timeline::{replay, EventKind, LifecycleState, Provenance},
    SynthConfig, SynthEngine,
};
use std::collections::{HashMap, HashSet};

fn dataset(seed: u64) -> Dataset {
    dataset_with(seed, |_| {})
}

fn dataset_with(seed: u64, tweak: impl FnOnce(&mut SynthConfig)) -> Dataset {
    let mut config = SynthConfig::default_test();
    config.seed = seed;
    config.population_size = 40;
    config.addresses.updates_per_year = 2.0;
    config.updates.updates_per_year = 1.5;
    config.timeline.random_event_count_weights = vec![5.0, 30.0, 40.0, 25.0];
    tweak(&mut config);
    SynthEngine::new(config).unwrap().generate().unwrap()
}

const SEEDS: [u64; 4] = [1, 17, 4242, 0xFEED];

#[test]
fn status_histories_are_contiguous_with_one_open_interval() {
    for seed in SEEDS {
        for r in &dataset(seed).entities {
            let s = &r.statuses;
            assert!(!s.is_empty());
            assert_eq!(s[0].status, StatusValue::Active);
            assert_eq!(s[0].valid_from, r.entity.onboarded_at);
            for pair in s.windows(2) {
                assert_eq!(pair[0].valid_to, Some(pair[1].valid_from), "gap for {}", r.entity.entity_id);
                assert!(pair[0].valid_from < pair[1].valid_from);
            }
            assert_eq!(s.iter().filter(|i| i.is_current()).count(), 1);
            assert!(s.last().unwrap().is_current());
        }
    }
}

#[test]
fn address_histories_are_contiguous_with_one_current_row() {
    for seed in SEEDS {
        for r in &dataset(seed).entities {
            let rows = r.addresses.records();
            assert_eq!(rows[0].effective_from, r.entity.onboarded_at);
            for pair in rows.windows(2) {
                assert_eq!(pair[0].effective_to, Some(pair[1].effective_from));
                assert!(pair[0].effective_from < pair[1].effective_from);
            }
            assert_eq!(rows.iter().filter(|a| a.is_current()).count(), 1);
        }
    }
}

#[test]
fn address_events_match_address_rows_exactly() {
    for seed in SEEDS {
        for r in &dataset(seed).entities {
            let updates: HashMap<&str, _> = r
                .addresses
                .records()
                .iter()
                .skip(1)
                .map(|a| (a.address_id.as_str(), a.effective_from))
                .collect();
            let events: Vec<_> = r.events.iter().filter(|e| e.kind == EventKind::AddressChange).collect();
            assert_eq!(events.len(), updates.len(), "{}", r.entity.entity_id);
            for e in events {
                assert_eq!(e.provenance, Provenance::DataDriven);
                let source = e.source_ref.as_deref().unwrap();
                assert_eq!(updates[source], e.timestamp);
            }
        }
    }
}

#[test]
fn timelines_replay_through_the_state_machine() {
    for seed in SEEDS {
        let data = dataset(seed);
        for r in &data.entities {
            let e = &r.events;
            assert_eq!(e[0].kind, EventKind::Onboarding);
            assert_eq!(e[0].timestamp, r.entity.onboarded_at);
            assert!(e.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
            assert!(e.iter().skip(1).all(|ev| ev.kind != EventKind::Onboarding));
            assert!(e.iter().all(|ev| ev.timestamp < data.horizon.end));

            let states = replay(&r.entity.entity_id, e, r.entity.closure_eligible, &r.dormancy).unwrap();
            assert_eq!(states.len(), e.len());
            assert_eq!(states[0], LifecycleState::Prospect);
            assert!(states[1..].iter().all(|s| *s != LifecycleState::Prospect));
            if !r.entity.closure_eligible {
                assert!(e.iter().all(|ev| !ev.kind.ends_relationship()));
            }
        }
    }
}

#[test]
fn random_events_stay_inside_the_active_horizon() {
    for seed in SEEDS {
        let data = dataset(seed);
        for r in &data.entities {
            let from = r.entity.active_from(&data.horizon);
            for e in r.events.iter().filter(|e| e.is_random()) {
                assert!(e.timestamp >= from && e.timestamp < data.horizon.end);
                assert_ne!(e.kind, EventKind::AddressChange);
            }
        }
    }
}

#[test]
fn identifiers_are_unique_across_the_run() {
    let data = dataset(99);
    let mut seen = HashSet::new();
    for r in &data.entities {
        let ids = r
            .events
            .iter()
            .map(|e| e.event_id.clone())
            .chain(r.statuses.iter().map(|s| s.status_id.clone()))
            .chain(r.addresses.records().iter().map(|a| a.address_id.clone()))
            .chain(r.updates.iter().map(|u| u.update_id.clone()))
            .chain(r.transactions.iter().map(|t| t.transaction_id.clone()));
        for id in ids {
            assert!(seen.insert(id.clone()), "duplicate id {id}");
        }
    }
}

#[test]
fn status_intervals_point_at_their_opening_event() {
    for r in &dataset(3).entities {
        let events: HashMap<&str, EventKind> =
            r.events.iter().map(|e| (e.event_id.as_str(), e.kind)).collect();
        for s in &r.statuses {
            let kind = events[s.event_id.as_str()];
            let expected = match s.status {
                StatusValue::Active => [EventKind::Onboarding, EventKind::Reactivation].contains(&kind),
                StatusValue::Closed => kind.ends_relationship(),
            };
            assert!(expected, "{} opened by {kind:?}", s.status_id);
        }
    }
}

#[test]
fn transactions_stay_inside_the_lifetime() {
    let data = dataset(21);
    for r in &data.entities {
        for t in &r.transactions {
            assert!(t.timestamp > r.entity.onboarded_at || r.flagged);
            assert!(t.timestamp < data.horizon.end);
        }
    }
}

#[test]
fn dormancy_and_closure_admit_only_reactivation() {
    for seed in SEEDS {
        let data = dataset(seed);
        for r in &data.entities {
            for e in r.events.iter().filter(|e| e.is_random()) {
                if r.dormancy.iter().any(|w| w.contains(&e.timestamp)) {
                    assert_eq!(e.kind, EventKind::Reactivation, "{} at {}", r.entity.entity_id, e.timestamp);
                }
            }
            for pair in r.events.windows(2) {
                if pair[0].kind.ends_relationship() {
                    assert_eq!(pair[1].kind, EventKind::Reactivation, "{}", r.entity.entity_id);
                }
            }
        }
    }
}

#[test]
fn reactivation_only_follows_dormancy_or_closure() {
    for seed in SEEDS {
        for r in &dataset(seed).entities {
            let states = replay(&r.entity.entity_id, &r.events, r.entity.closure_eligible, &r.dormancy).unwrap();
            for (e, before) in r.events.iter().zip(&states) {
                if e.kind == EventKind::Reactivation {
                    assert!(
                        matches!(before, LifecycleState::Dormant | LifecycleState::Closed),
                        "{} reactivated from {before:?}",
                        e.event_id
                    );
                }
            }
            for w in &r.dormancy {
                let inside: Vec<_> = r.events.iter().filter(|e| w.contains(&e.timestamp)).collect();
                for pair in inside.windows(2) {
                    let twice = pair.iter().all(|e| e.kind == EventKind::Reactivation);
                    assert!(!twice, "{} reactivated twice in one dormancy window", r.entity.entity_id);
                }
            }
        }
    }
}

#[test]
fn update_events_match_customer_updates_exactly() {
    let mut total = 0;
    for seed in SEEDS {
        for r in &dataset(seed).entities {
            let updates: HashMap<&str, _> = r.updates.iter().map(|u| (u.update_id.as_str(), u)).collect();
            let events: Vec<_> = r
                .events
                .iter()
                .filter(|e| e.payload.details.get("update_id").is_some())
                .collect();
            assert_eq!(events.len(), updates.len(), "{}", r.entity.entity_id);
            for e in events {
                let u = updates[e.source_ref.as_deref().unwrap()];
                assert_eq!(e.provenance, Provenance::DataDriven);
                assert_eq!(e.kind, u.kind.event_kind());
                assert_eq!(e.timestamp, u.effective_at);
                assert_eq!(e.payload.new_value, u.new_value);
                assert!(!r.dormancy.iter().any(|w| w.contains(&u.effective_at)));
            }
            total += r.updates.len();
        }
    }
    assert!(total > 0);
}

#[test]
fn no_transaction_falls_in_a_recorded_dormancy_window() {
    let mut windows = 0;
    for seed in SEEDS {
        let data = dataset_with(seed, |c| {
            c.anomaly.rate = 1.0;
            c.transactions.quiet_spell_probability = 0.8;
        });
        for r in &data.entities {
            assert!(r.flagged);
            windows += r.dormancy.len();
            for t in &r.transactions {
                assert!(
                    !r.dormancy.iter().any(|w| w.contains(&t.timestamp)),
                    "{} {} inside a dormancy window",
                    r.entity.entity_id,
                    t.transaction_id
                );
            }
        }
    }
    assert!(windows > 0);
}
