// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use chrono::TimeZone;
use yare::parameterized;

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

#[parameterized(
    draft_to_active = { SubscriptionStatus::Draft, SubscriptionStatus::Active, true },
    draft_to_paused = { SubscriptionStatus::Draft, SubscriptionStatus::Paused, false },
    active_to_paused = { SubscriptionStatus::Active, SubscriptionStatus::Paused, true },
    paused_to_active = { SubscriptionStatus::Paused, SubscriptionStatus::Active, true },
    paused_to_cancelled = { SubscriptionStatus::Paused, SubscriptionStatus::Cancelled, true },
    active_to_draft = { SubscriptionStatus::Active, SubscriptionStatus::Draft, false },
    cancelled_to_active = { SubscriptionStatus::Cancelled, SubscriptionStatus::Active, false },
    active_to_active = { SubscriptionStatus::Active, SubscriptionStatus::Active, false },
)]
fn status_transitions(from: SubscriptionStatus, to: SubscriptionStatus, allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
    assert_eq!(from.check_transition(to).is_ok(), allowed);
}

#[test]
fn status_parse_accepts_us_spelling() {
    assert_eq!(
        "CANCELED".parse::<SubscriptionStatus>().unwrap(),
        SubscriptionStatus::Cancelled
    );
    assert!("expired".parse::<SubscriptionStatus>().is_err());
}

#[parameterized(
    one_month = { "1month", IntervalUnit::Month, 1 },
    plural = { "2weeks", IntervalUnit::Week, 2 },
    days = { "30day", IntervalUnit::Day, 30 },
    year = { "1year", IntervalUnit::Year, 1 },
)]
fn interval_parse(input: &str, unit: IntervalUnit, count: u32) {
    let interval: BillingInterval = input.parse().unwrap();
    assert_eq!(interval, BillingInterval::new(unit, count));
}

#[parameterized(
    empty = { "" },
    no_unit = { "3" },
    zero = { "0month" },
    bad_unit = { "1fortnight" },
)]
fn interval_parse_rejects(input: &str) {
    assert!(input.parse::<BillingInterval>().is_err());
}

#[test]
fn monthly_advance_keeps_day_of_month() {
    let next = BillingInterval::monthly().advance(day(2025, 1, 15)).unwrap();
    assert_eq!(next, day(2025, 2, 15));
}

#[test]
fn monthly_advance_clamps_short_months() {
    let next = BillingInterval::monthly().advance(day(2025, 1, 31)).unwrap();
    assert_eq!(next, day(2025, 2, 28));
}

#[test]
fn weekly_and_yearly_advance() {
    let weekly = BillingInterval::new(IntervalUnit::Week, 2);
    assert_eq!(weekly.advance(day(2025, 1, 1)).unwrap(), day(2025, 1, 15));

    let yearly = BillingInterval::new(IntervalUnit::Year, 1);
    assert_eq!(yearly.advance(day(2024, 2, 29)).unwrap(), day(2025, 2, 28));
}

#[parameterized(
    first_cycle = { day(2025, 1, 31), day(2025, 2, 28) },
    back_to_month_end = { day(2025, 2, 28), day(2025, 3, 31) },
    thirty_day_month = { day(2025, 3, 31), day(2025, 4, 30) },
    after_thirty_day_month = { day(2025, 4, 30), day(2025, 5, 31) },
)]
fn month_end_schedule_does_not_drift(current: DateTime<Utc>, expected: DateTime<Utc>) {
    let next = BillingInterval::monthly()
        .next_on_schedule(day(2025, 1, 31), current)
        .unwrap();
    assert_eq!(next, expected);
}

#[test]
fn off_schedule_date_advances_on_its_own() {
    let monthly = BillingInterval::monthly();
    let next = monthly.next_on_schedule(day(2025, 1, 31), day(2025, 3, 10)).unwrap();
    assert_eq!(next, day(2025, 4, 10));

    let before_anchor = monthly.next_on_schedule(day(2025, 1, 31), day(2025, 1, 5)).unwrap();
    assert_eq!(before_anchor, day(2025, 2, 5));
}

#[test]
fn contract_cycles_follow_both_anchors() {
    let mut contract = SubscriptionContract {
        id: 1,
        customer_id: 1,
        selling_plan_id: 1,
        status: SubscriptionStatus::Active,
        next_billing_at: day(2025, 2, 28),
        next_delivery_at: day(2025, 3, 2),
        billing_anchor_at: day(2025, 1, 31),
        delivery_anchor_at: day(2025, 2, 2),
        interval: BillingInterval::monthly(),
        line_items: Vec::new(),
        delivery_address_id: 1,
        payment_method_ref: None,
        created_at: day(2025, 1, 1),
        updated_at: day(2025, 1, 1),
        field_times: BTreeMap::new(),
    };

    let (billing, delivery) = contract.next_cycle_dates().unwrap();
    assert_eq!(billing, day(2025, 3, 31));
    assert_eq!(delivery, day(2025, 4, 2));

    contract.next_billing_at = billing;
    contract.next_delivery_at = delivery;
    let (billing, _) = contract.next_cycle_dates().unwrap();
    assert_eq!(billing, day(2025, 4, 30));
}

#[test]
fn idempotency_key_is_deterministic_per_cycle() {
    let a = billing_idempotency_key(12, day(2025, 1, 15));
    let b = billing_idempotency_key(12, Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap());
    let c = billing_idempotency_key(12, day(2025, 2, 15));
    assert_eq!(a, "sub-12:2025-01-15");
    assert_eq!(a, b);
    assert_ne!(a, c);
}
