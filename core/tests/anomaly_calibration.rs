//! Anomaly selection and injection over whole populations.
//!
//! Checks the guarantees a scoring harness relies on: how many entities
//! are flagged, how many labels each carries, where they sit in time, and
//! that ground truth never leaks into the observed records.

use amlsynth_core::{
    anomaly::{flagged_count, strip_markers, PatternKind},
    engine::Dataset,
    store::LabelStore,
    transactions::Transaction,
    SynthConfig, SynthEngine,
};
use chrono::Duration;
use std::collections::{HashMap, HashSet};

fn generate(seed: u64, population: usize, rate: f64, tweak: impl FnOnce(&mut SynthConfig)) -> Dataset {
    let mut config = SynthConfig::default_test();
    config.seed = seed;
    config.population_size = population;
    config.anomaly.rate = rate;
    tweak(&mut config);
    SynthEngine::new(config).unwrap().generate().unwrap()
}

fn by_id(txns: &[Transaction]) -> HashMap<&str, &Transaction> {
    txns.iter().map(|t| (t.transaction_id.as_str(), t)).collect()
}

#[test]
fn flagged_population_matches_the_rounded_rate() {
    for (population, rate) in [(10, 0.3), (25, 0.1), (7, 0.5), (40, 0.02), (3, 0.01)] {
        let data = generate(11, population, rate, |_| {});
        let flagged = data.entities.iter().filter(|r| r.flagged).count();
        assert_eq!(flagged, flagged_count(rate, population), "N={population} r={rate}");
    }
}

#[test]
fn labels_per_entity_respect_the_cap() {
    let data = generate(5, 30, 0.5, |c| c.anomaly.max_per_entity = 3);
    for r in data.entities.iter().filter(|r| r.flagged) {
        assert!((1..=3).contains(&r.labels.len()), "{} has {}", r.entity.entity_id, r.labels.len());
        let ids: HashSet<_> = r.labels.iter().map(|l| &l.transaction_id).collect();
        assert_eq!(ids.len(), r.labels.len(), "one label per transaction");
    }
}

#[test]
fn labels_cluster_inside_one_bounded_window() {
    let data = generate(8, 30, 0.4, |c| c.anomaly.cluster_window_days = 10);
    for r in data.entities.iter().filter(|r| r.flagged) {
        let first = &r.labels[0];
        for l in &r.labels {
            assert_eq!((l.cluster_start, l.cluster_end), (first.cluster_start, first.cluster_end));
            assert!(l.injected_at >= l.cluster_start && l.injected_at < l.cluster_end);
        }
        assert!(first.cluster_end - first.cluster_start <= Duration::days(10));
        assert!(first.cluster_start >= r.entity.active_from(&data.horizon));
        assert!(first.cluster_end <= data.horizon.end);
    }
}

/// Compared in USD: one cluster can mix currencies.
#[test]
fn labelled_amounts_increase_over_time() {
    let data = generate(13, 30, 0.5, |_| {});
    for r in data.entities.iter().filter(|r| r.flagged) {
        let txns = by_id(&r.transactions);
        let mut labelled: Vec<&Transaction> =
            r.labels.iter().map(|l| txns[l.transaction_id.as_str()]).collect();
        labelled.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.transaction_id.cmp(&b.transaction_id)));
        for w in labelled.windows(2) {
            assert!(
                w[0].base_amount_usd.abs() < w[1].base_amount_usd.abs(),
                "{}: {} {} then {} {}",
                r.entity.entity_id,
                w[0].amount,
                w[0].currency,
                w[1].amount,
                w[1].currency
            );
        }
    }
}

#[test]
fn pattern_lists_follow_declared_order() {
    let data = generate(2, 40, 0.5, |c| c.anomaly.mixing_probability = 1.0);
    for l in data.labels() {
        assert!(!l.patterns.is_empty());
        assert!(l.patterns.windows(2).all(|w| w[0] < w[1]), "{:?}", l.patterns);
        assert!(!(l.patterns.contains(&PatternKind::SuspiciousCounterparty)
            && l.patterns.contains(&PatternKind::NewBeneficiaryLarge)));
    }
}

#[test]
fn high_frequency_bursts_fit_inside_a_day() {
    let data = generate(4, 20, 0.5, |c| {
        c.anomaly.catalog = vec![PatternKind::HighFrequency];
        c.anomaly.max_per_entity = 6;
    });
    for r in data.entities.iter().filter(|r| r.flagged) {
        assert!(r.labels.len() >= 3);
        let first = r.labels.iter().map(|l| l.injected_at).min().unwrap();
        let last = r.labels.iter().map(|l| l.injected_at).max().unwrap();
        assert!(last - first < Duration::hours(24), "{}", r.entity.entity_id);
    }
}

#[test]
fn new_beneficiaries_are_unseen_in_the_entity_history() {
    let data = generate(6, 20, 0.5, |c| c.anomaly.catalog = vec![PatternKind::NewBeneficiaryLarge]);
    for r in data.entities.iter().filter(|r| r.flagged) {
        let txns = by_id(&r.transactions);
        for l in &r.labels {
            let cp = &txns[l.transaction_id.as_str()].counterparty;
            let uses = r.transactions.iter().filter(|t| &t.counterparty == cp).count();
            assert_eq!(uses, 1, "{cp} reused by {}", r.entity.entity_id);
        }
    }
}

#[test]
fn descriptions_stay_clean_without_markers() {
    let data = generate(9, 20, 0.5, |_| {});
    for r in &data.entities {
        for t in &r.transactions {
            assert!(!t.description.contains('['), "{}", t.transaction_id);
        }
    }
}

#[test]
fn markers_appear_only_on_labelled_transactions() {
    let data = generate(9, 20, 0.5, |c| c.anomaly.description_markers = true);
    for r in &data.entities {
        let labelled: HashMap<&str, &Vec<PatternKind>> =
            r.labels.iter().map(|l| (l.transaction_id.as_str(), &l.patterns)).collect();
        for t in &r.transactions {
            match labelled.get(t.transaction_id.as_str()) {
                Some(patterns) => {
                    for p in patterns.iter() {
                        assert!(t.description.contains(p.marker()));
                    }
                    assert!(!strip_markers(&t.description).contains('['));
                }
                None => assert!(!t.description.contains('[')),
            }
        }
    }
}

#[test]
fn label_store_holds_exactly_the_generated_labels() {
    let data = generate(10, 25, 0.4, |_| {});
    let mut store = LabelStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.insert_run(&data.run_id, 10, data.entities.len(), 0.4, "{}").unwrap();
    let labels: Vec<_> = data.labels().cloned().collect();
    store.insert_labels(&labels).unwrap();

    assert_eq!(store.label_count(&data.run_id).unwrap(), labels.len());
    let mut flagged = data.flagged_entity_ids();
    flagged.sort();
    assert_eq!(store.flagged_entities(&data.run_id).unwrap(), flagged);

    let stored = store.labels_for_run(&data.run_id).unwrap();
    let mut expected = labels;
    expected.sort_by(|a, b| {
        (&a.entity_id, a.injected_at, &a.transaction_id).cmp(&(&b.entity_id, b.injected_at, &b.transaction_id))
    });
    assert_eq!(stored, expected);
}
