//! End-to-end acceptance scenarios.
//!
//! Each scenario pins one observable behaviour of the generator with a
//! small, hand-shaped configuration.

use amlsynth_core::{
    ids::IdBlock,
    registry::{Entity, EntityRegistry},
    rng::StreamRng,
    status::{self, StatusValue},
    timeline::{EventKind, EventScheduler, LifecycleEvent, Provenance},
    SynthConfig, SynthEngine,
};
use chrono::{Duration, NaiveDate};

fn config(days: u32, population: usize, rate: f64) -> SynthConfig {
    let mut config = SynthConfig::default_test();
    config.horizon.start_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    config.horizon.days = days;
    config.population_size = population;
    config.anomaly.rate = rate;
    config
}

/// 10 entities, six months, rate 0.3: exactly three flagged, each with
/// at least one label, nobody else labelled.
#[test]
fn scenario_a_flags_exactly_three_of_ten() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dataset = SynthEngine::new(config(182, 10, 0.3)).unwrap().generate().unwrap();

    let flagged: Vec<_> = dataset.entities.iter().filter(|r| r.flagged).collect();
    assert_eq!(flagged.len(), 3);
    for r in &dataset.entities {
        if r.flagged {
            assert!(!r.labels.is_empty(), "{} flagged without labels", r.entity.entity_id);
        } else {
            assert!(r.labels.is_empty(), "{} labelled but not flagged", r.entity.entity_id);
        }
    }
    assert_eq!(dataset.flagged_entity_ids().len(), 3);
}

/// Onboarded on day 0 of a 30-day horizon: the timeline is the onboarding
/// event alone.
#[test]
fn scenario_b_short_horizon_yields_only_onboarding() {
    let mut cfg = config(30, 1, 0.0);
    cfg.addresses.updates_per_year = 0.0;
    cfg.updates.updates_per_year = 0.0;
    cfg.timeline.random_event_count_weights = vec![0.0, 0.0, 0.0, 1.0];
    let horizon = cfg.horizon();
    let entity = Entity::new(0, horizon.start, true);

    for seed in 0..20 {
        let mut ids = IdBlock::for_entity(0);
        let events = EventScheduler::new(&cfg.timeline, horizon)
            .schedule(&entity, Vec::new(), &[], &mut ids, &mut StreamRng::new(seed, 1, 3))
            .unwrap();
        assert_eq!(events.len(), 1, "seed {seed}");
        assert_eq!(events[0].kind, EventKind::Onboarding);
        assert_eq!(events[0].timestamp, horizon.start);
    }

    let engine = SynthEngine::new(cfg).unwrap();
    let dataset = engine
        .generate_for(&EntityRegistry::from_entities(vec![entity]))
        .unwrap();
    let events = &dataset.entities[0].events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Onboarding);
    assert!(events.iter().all(|e| e.timestamp < horizon.end));
}

/// CHURN at day 100 with nothing after it: the history ends in one open
/// CLOSED interval starting at the churn instant.
#[test]
fn scenario_c_churn_closes_the_history() {
    let mut cfg = config(365, 1, 0.0);
    cfg.timeline.random_event_count_weights = vec![1.0, 0.0, 0.0, 0.0];
    let horizon = cfg.horizon();
    let entity = Entity::new(0, horizon.start - Duration::days(90), true);
    let churn_at = horizon.start + Duration::days(100) + Duration::hours(11);
    let churn = LifecycleEvent::new(&entity.entity_id, EventKind::Churn, churn_at, Provenance::DataDriven);

    let mut ids = IdBlock::for_entity(0);
    let events = EventScheduler::new(&cfg.timeline, horizon)
        .schedule(&entity, vec![churn], &[], &mut ids, &mut StreamRng::new(1, 1, 3))
        .unwrap();
    assert_eq!(events.last().unwrap().kind, EventKind::Churn);

    let intervals = status::project(&entity.entity_id, &events, &mut ids).unwrap();
    assert_eq!(intervals.len(), 2);
    assert_eq!(intervals[0].status, StatusValue::Active);
    assert_eq!(intervals[0].valid_to, Some(churn_at));

    let last = intervals.last().unwrap();
    assert_eq!(last.status, StatusValue::Closed);
    assert_eq!(last.valid_from, churn_at);
    assert_eq!(last.valid_to, None);
    assert_eq!(last.reason, "CHURN_EVENT");
    assert_eq!(intervals.iter().filter(|i| i.valid_to.is_none()).count(), 1);
}

/// Rate 0 produces a clean dataset with no labels anywhere.
#[test]
fn zero_rate_flags_nobody() {
    let dataset = SynthEngine::new(config(120, 15, 0.0)).unwrap().generate().unwrap();
    assert!(dataset.entities.iter().all(|r| !r.flagged));
    assert_eq!(dataset.labels().count(), 0);
}

/// Rate 1 flags the whole population.
#[test]
fn full_rate_flags_everybody() {
    let dataset = SynthEngine::new(config(120, 6, 1.0)).unwrap().generate().unwrap();
    assert!(dataset.entities.iter().all(|r| r.flagged && !r.labels.is_empty()));
}

/// A registry whose indices skip a slot is refused.
#[test]
fn registry_with_gaps_is_rejected() {
    let cfg = config(60, 2, 0.0);
    let horizon = cfg.horizon();
    let registry = EntityRegistry::from_entities(vec![
        Entity::new(0, horizon.start, true),
        Entity::new(2, horizon.start, true),
    ]);
    let err = SynthEngine::new(cfg).unwrap().generate_for(&registry).unwrap_err();
    assert!(err.to_string().contains("registry slot 1"));
}
