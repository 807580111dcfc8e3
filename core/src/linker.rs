//! Cross-artifact consistency.
//!
//! RULE: An ADDRESS_CHANGE event takes its instant from the AddressRecord
//! it mirrors. An EMPLOYMENT_CHANGE or TIER_UPGRADE with a source takes its
//! instant from the CustomerUpdate it mirrors. Nothing here draws a
//! timestamp.

use crate::{
    address::AddressHistory,
    error::{SynthError, SynthResult},
    timeline::{Channel, EventKind, LifecycleEvent, Provenance, ReviewStatus},
    updates::CustomerUpdate,
};
use serde_json::json;
use std::collections::HashMap;

/// One DATA_DRIVEN ADDRESS_CHANGE per address update, carrying the
/// record's own `effective_from` and id.
pub fn address_change_events(history: &AddressHistory) -> Vec<LifecycleEvent> {
    history
        .changes()
        .map(|(previous, record)| {
            let mut event = LifecycleEvent::new(
                &record.entity_id,
                EventKind::AddressChange,
                record.effective_from,
                Provenance::DataDriven,
            );
            let cross_border = previous.address.country != record.address.country;
            event.payload.previous_value = Some(previous.address.one_line());
            event.payload.new_value = Some(record.address.one_line());
            event.payload.details = json!({
                "address_id": record.address_id,
                "country_from": previous.address.country,
                "country_to": record.address.country,
            });
            event.triggered_by = "CUSTOMER".to_string();
            event.source_ref = Some(record.address_id.clone());
            if cross_border {
                event.requires_review = true;
                event.review_status = ReviewStatus::Pending;
                event.notes = "Cross-border address change pending review".to_string();
            } else {
                event.notes = "Address updated".to_string();
            }
            event
        })
        .collect()
}

/// One DATA_DRIVEN event per customer update. Values are left for the
/// scheduler to resolve in timeline order.
pub fn customer_update_events(updates: &[CustomerUpdate]) -> Vec<LifecycleEvent> {
    updates
        .iter()
        .map(|u| {
            let mut event = LifecycleEvent::new(
                &u.entity_id,
                u.kind.event_kind(),
                u.effective_at,
                Provenance::DataDriven,
            );
            event.channel = Channel::System;
            event.triggered_by = "SYSTEM".to_string();
            event.source_ref = Some(u.update_id.clone());
            event
        })
        .collect()
}

/// Copy the values the scheduler resolved back onto the updates they came
/// from.
pub fn settle_update_values(updates: &mut [CustomerUpdate], events: &[LifecycleEvent]) {
    let by_source: HashMap<&str, &LifecycleEvent> = events
        .iter()
        .filter_map(|e| e.source_ref.as_deref().map(|s| (s, e)))
        .collect();
    for u in updates.iter_mut() {
        if let Some(e) = by_source.get(u.update_id.as_str()) {
            u.previous_value = e.payload.previous_value.clone();
            u.new_value = e.payload.new_value.clone();
        }
    }
}

/// Every customer update has exactly one event of its kind at the identical
/// instant carrying the same values, and every sourced EMPLOYMENT_CHANGE or
/// TIER_UPGRADE points at a real update.
pub fn verify_update_agreement(
    entity_id: &str,
    events: &[LifecycleEvent],
    updates: &[CustomerUpdate],
) -> SynthResult<()> {
    let by_id: HashMap<&str, &CustomerUpdate> = updates.iter().map(|u| (u.update_id.as_str(), u)).collect();

    let mut matched = 0usize;
    let sourced = events.iter().filter(|e| {
        matches!(e.kind, EventKind::EmploymentChange | EventKind::TierUpgrade) && e.source_ref.is_some()
    });
    for event in sourced {
        let source = event.source_ref.as_deref().unwrap_or_default();
        let Some(update) = by_id.get(source) else {
            return Err(SynthError::constraint(
                entity_id,
                format!("{} {} references unknown update {source}", event.kind.code(), event.event_id),
            ));
        };
        let agrees = update.kind.event_kind() == event.kind
            && update.effective_at == event.timestamp
            && update.previous_value == event.payload.previous_value
            && update.new_value == event.payload.new_value;
        if !agrees {
            return Err(SynthError::constraint(
                entity_id,
                format!(
                    "{} {} at {} disagrees with update {source} effective {}",
                    event.kind.code(),
                    event.event_id,
                    event.timestamp,
                    update.effective_at
                ),
            ));
        }
        if event.provenance != Provenance::DataDriven {
            return Err(SynthError::constraint(
                entity_id,
                format!("{} {} mirrors an update but is not DATA_DRIVEN", event.kind.code(), event.event_id),
            ));
        }
        matched += 1;
    }
    if matched != updates.len() {
        return Err(SynthError::constraint(
            entity_id,
            format!("{} customer updates but {matched} matching events", updates.len()),
        ));
    }
    Ok(())
}

/// Every address update has exactly one ADDRESS_CHANGE event with an
/// identical instant, and every ADDRESS_CHANGE points at a real update.
pub fn verify_address_agreement(
    entity_id: &str,
    events: &[LifecycleEvent],
    history: &AddressHistory,
) -> SynthResult<()> {
    let updates: HashMap<&str, _> = history
        .changes()
        .map(|(_, r)| (r.address_id.as_str(), r.effective_from))
        .collect();

    let mut matched = 0usize;
    for event in events.iter().filter(|e| e.kind == EventKind::AddressChange) {
        let Some(source) = event.source_ref.as_deref() else {
            return Err(SynthError::constraint(
                entity_id,
                format!("ADDRESS_CHANGE {} has no source address", event.event_id),
            ));
        };
        match updates.get(source) {
            Some(effective_from) if *effective_from == event.timestamp => matched += 1,
            Some(effective_from) => {
                return Err(SynthError::constraint(
                    entity_id,
                    format!(
                        "ADDRESS_CHANGE {} at {} disagrees with address {source} effective {}",
                        event.event_id, event.timestamp, effective_from
                    ),
                ))
            }
            None => {
                return Err(SynthError::constraint(
                    entity_id,
                    format!("ADDRESS_CHANGE {} references unknown address {source}", event.event_id),
                ))
            }
        }
    }
    if matched != updates.len() {
        return Err(SynthError::constraint(
            entity_id,
            format!("{} address updates but {matched} ADDRESS_CHANGE events", updates.len()),
        ));
    }
    Ok(())
}
