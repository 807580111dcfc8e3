//! Row shapes for every detector-visible CSV artifact.

use crate::{
    address::AddressRecord,
    registry::{Account, Entity, TIERS},
    status::StatusInterval,
    timeline::LifecycleEvent,
    transactions::Transaction,
    types::{format_date, format_ts},
    updates::CustomerUpdate,
};
use serde::Serialize;

fn opt_ts(ts: &Option<chrono::NaiveDateTime>) -> String {
    ts.as_ref().map(format_ts).unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct CustomerRow {
    pub customer_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub occupation: String,
    pub tier: String,
    pub country: String,
    pub currency: String,
    pub onboarding_timestamp: String,
    pub closure_eligible: bool,
}

impl From<&Entity> for CustomerRow {
    fn from(e: &Entity) -> Self {
        Self {
            customer_id: e.entity_id.clone(),
            first_name: e.first_name.clone(),
            last_name: e.last_name.clone(),
            date_of_birth: format_date(&e.date_of_birth),
            occupation: e.occupation.clone(),
            tier: TIERS.get(e.initial_tier).copied().unwrap_or("BASIC").to_string(),
            country: e.country.clone(),
            currency: e.currency.clone(),
            onboarding_timestamp: format_ts(&e.onboarded_at),
            closure_eligible: e.closure_eligible,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountRow {
    pub account_id: String,
    pub customer_id: String,
    pub account_type: &'static str,
    pub currency: String,
    pub opened_at: String,
}

impl From<&Account> for AccountRow {
    fn from(a: &Account) -> Self {
        Self {
            account_id: a.account_id.clone(),
            customer_id: a.entity_id.clone(),
            account_type: a.account_type.code(),
            currency: a.currency.clone(),
            opened_at: format_ts(&a.opened_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddressRow {
    pub address_id: String,
    pub customer_id: String,
    pub address_line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub effective_from: String,
    pub effective_to: String,
    pub is_current: bool,
}

impl From<&AddressRecord> for AddressRow {
    fn from(r: &AddressRecord) -> Self {
        Self {
            address_id: r.address_id.clone(),
            customer_id: r.entity_id.clone(),
            address_line1: r.address.line1.clone(),
            city: r.address.city.clone(),
            postal_code: r.address.postal_code.clone(),
            country: r.address.country.clone(),
            effective_from: format_ts(&r.effective_from),
            effective_to: opt_ts(&r.effective_to),
            is_current: r.is_current(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdateRow {
    pub update_id: String,
    pub customer_id: String,
    pub update_type: &'static str,
    pub effective_timestamp: String,
    pub previous_value: String,
    pub new_value: String,
}

impl From<&CustomerUpdate> for UpdateRow {
    fn from(u: &CustomerUpdate) -> Self {
        Self {
            update_id: u.update_id.clone(),
            customer_id: u.entity_id.clone(),
            update_type: u.kind.code(),
            effective_timestamp: format_ts(&u.effective_at),
            previous_value: u.previous_value.clone().unwrap_or_default(),
            new_value: u.new_value.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusRow {
    pub status_id: String,
    pub customer_id: String,
    pub status: &'static str,
    pub status_reason: String,
    pub valid_from: String,
    pub valid_to: String,
    pub is_current: bool,
    pub event_id: String,
}

impl From<&StatusInterval> for StatusRow {
    fn from(s: &StatusInterval) -> Self {
        Self {
            status_id: s.status_id.clone(),
            customer_id: s.entity_id.clone(),
            status: s.status.code(),
            status_reason: s.reason.clone(),
            valid_from: format_ts(&s.valid_from),
            valid_to: opt_ts(&s.valid_to),
            is_current: s.is_current(),
            event_id: s.event_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventRow {
    pub event_id: String,
    pub customer_id: String,
    pub event_type: &'static str,
    pub event_timestamp: String,
    pub provenance: &'static str,
    pub previous_value: String,
    pub new_value: String,
    pub channel: &'static str,
    pub triggered_by: String,
    pub requires_review: bool,
    pub review_status: &'static str,
    pub review_date: String,
    pub notes: String,
    pub details: String,
}

impl From<&LifecycleEvent> for EventRow {
    fn from(e: &LifecycleEvent) -> Self {
        Self {
            event_id: e.event_id.clone(),
            customer_id: e.entity_id.clone(),
            event_type: e.kind.code(),
            event_timestamp: format_ts(&e.timestamp),
            provenance: e.provenance.code(),
            previous_value: e.payload.previous_value.clone().unwrap_or_default(),
            new_value: e.payload.new_value.clone().unwrap_or_default(),
            channel: e.channel.code(),
            triggered_by: e.triggered_by.clone(),
            requires_review: e.requires_review,
            review_status: e.review_status.code(),
            review_date: e.review_date.as_ref().map(format_date).unwrap_or_default(),
            notes: e.notes.clone(),
            details: e.payload.details.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionRow {
    pub transaction_id: String,
    pub customer_id: String,
    pub account_id: String,
    pub booking_timestamp: String,
    pub value_date: String,
    pub amount: String,
    pub currency: String,
    pub fx_rate: String,
    pub base_amount_usd: String,
    pub direction: &'static str,
    pub counterparty: String,
    pub description: String,
}

impl From<&Transaction> for TransactionRow {
    fn from(t: &Transaction) -> Self {
        Self {
            transaction_id: t.transaction_id.clone(),
            customer_id: t.entity_id.clone(),
            account_id: t.account_id.clone(),
            booking_timestamp: format_ts(&t.timestamp),
            value_date: format_date(&t.value_date),
            amount: format!("{:.2}", t.amount),
            currency: t.currency.clone(),
            fx_rate: format!("{:.4}", t.fx_rate),
            base_amount_usd: format!("{:.2}", t.base_amount_usd),
            direction: t.direction.code(),
            counterparty: t.counterparty.clone(),
            description: t.description.clone(),
        }
    }
}
