//! crates/mangati_core/src/entitlement.rs
//!
//! Subscription records and the monthly upload quota they gate.
//!
//! The quota rules are pure functions over a [`Subscription`]; persistence
//! adapters load the record, call [`charge_upload`] and write the record back in
//! the same transaction as the chapter insert, so a failed insert never leaves a
//! charge behind.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionPlan {
    pub id: i64,
    pub name: String,
    pub price_cents: i64,
    pub upload_limit_per_month: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
    PaymentFailed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "Active",
            SubscriptionStatus::Cancelled => "Cancelled",
            SubscriptionStatus::Expired => "Expired",
            SubscriptionStatus::PaymentFailed => "PaymentFailed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Active" => Some(SubscriptionStatus::Active),
            "Cancelled" => Some(SubscriptionStatus::Cancelled),
            "Expired" => Some(SubscriptionStatus::Expired),
            "PaymentFailed" => Some(SubscriptionStatus::PaymentFailed),
            _ => None,
        }
    }
}

/// A principal's entitlement record. At most one exists per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub user_id: Uuid,
    pub plan: SubscriptionPlan,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: SubscriptionStatus,
    pub chapters_uploaded_this_month: i32,
    pub last_upload_reset_date: DateTime<Utc>,
}

impl Subscription {
    /// A fresh, active subscription with an untouched counter.
    pub fn start(user_id: Uuid, plan: SubscriptionPlan, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            plan,
            start_date: now,
            end_date: None,
            status: SubscriptionStatus::Active,
            chapters_uploaded_this_month: 0,
            last_upload_reset_date: now,
        }
    }

    /// Active status and not past its end date.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date.map_or(true, |end| end > now)
    }

    /// Whether the counter belongs to an earlier calendar month than `now`.
    pub fn needs_reset(&self, now: DateTime<Utc>) -> bool {
        let last = self.last_upload_reset_date;
        (last.year(), last.month()) != (now.year(), now.month())
    }

    /// Zeroes the counter if a new calendar month has started since the last reset.
    pub fn roll_month(&mut self, now: DateTime<Utc>) {
        if self.needs_reset(now) {
            self.chapters_uploaded_this_month = 0;
            self.last_upload_reset_date = now;
        }
    }

    /// Uploads charged in the current month, as `roll_month` would leave it.
    pub fn used_this_month(&self, now: DateTime<Utc>) -> i32 {
        if self.needs_reset(now) {
            0
        } else {
            self.chapters_uploaded_this_month
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> i32 {
        (self.plan.upload_limit_per_month - self.used_this_month(now)).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    #[error("Active subscription required to upload chapters")]
    SubscriptionRequired,
    #[error("Monthly upload limit reached ({limit} chapters)")]
    LimitReached { limit: i32 },
}

/// Where a principal's record stands with respect to the next gated upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementState {
    NoSubscription,
    ActiveUnderLimit,
    ActiveAtLimit,
    Inactive,
}

pub fn entitlement_state(subscription: Option<&Subscription>, now: DateTime<Utc>) -> EntitlementState {
    match subscription {
        None => EntitlementState::NoSubscription,
        Some(sub) if !sub.is_active(now) => EntitlementState::Inactive,
        Some(sub) if sub.used_this_month(now) >= sub.plan.upload_limit_per_month => {
            EntitlementState::ActiveAtLimit
        }
        Some(_) => EntitlementState::ActiveUnderLimit,
    }
}

/// How a chapter upload is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCharge {
    /// Admins upload without limit and without a subscription.
    Exempt,
    /// Charge one upload against this user's monthly quota.
    Quota { user_id: Uuid },
}

/// Applies one gated upload to `subscription`.
///
/// On success the counter has been incremented and the caller must persist the
/// record together with the content it gates. On failure the record is left as
/// it was, apart from a month rollover which is harmless to persist or drop.
pub fn charge_upload(
    subscription: Option<&mut Subscription>,
    now: DateTime<Utc>,
) -> Result<(), QuotaError> {
    let sub = subscription.ok_or(QuotaError::SubscriptionRequired)?;
    if !sub.is_active(now) {
        return Err(QuotaError::SubscriptionRequired);
    }

    sub.roll_month(now);

    let limit = sub.plan.upload_limit_per_month;
    if sub.chapters_uploaded_this_month >= limit {
        return Err(QuotaError::LimitReached { limit });
    }

    sub.chapters_uploaded_this_month += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan(limit: i32) -> SubscriptionPlan {
        SubscriptionPlan {
            id: 1,
            name: "Basic".to_string(),
            price_cents: 499,
            upload_limit_per_month: limit,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap()
    }

    fn subscription(used: i32, limit: i32, last_reset: DateTime<Utc>) -> Subscription {
        Subscription {
            chapters_uploaded_this_month: used,
            last_upload_reset_date: last_reset,
            ..Subscription::start(Uuid::new_v4(), plan(limit), last_reset)
        }
    }

    #[test]
    fn missing_subscription_is_rejected() {
        assert_eq!(
            charge_upload(None, at(2026, 3, 1)),
            Err(QuotaError::SubscriptionRequired)
        );
    }

    #[test]
    fn first_upload_increments_counter() {
        let now = at(2026, 3, 10);
        let mut sub = subscription(0, 10, at(2026, 3, 1));
        assert_eq!(charge_upload(Some(&mut sub), now), Ok(()));
        assert_eq!(sub.chapters_uploaded_this_month, 1);
    }

    #[test]
    fn upload_at_limit_is_rejected_and_counter_unchanged() {
        let now = at(2026, 3, 20);
        let mut sub = subscription(10, 10, at(2026, 3, 1));
        assert_eq!(
            charge_upload(Some(&mut sub), now),
            Err(QuotaError::LimitReached { limit: 10 })
        );
        assert_eq!(sub.chapters_uploaded_this_month, 10);
        assert_eq!(entitlement_state(Some(&sub), now), EntitlementState::ActiveAtLimit);
    }

    #[test]
    fn new_month_resets_before_comparing() {
        let now = at(2026, 4, 2);
        let mut sub = subscription(10, 10, at(2026, 3, 28));
        assert_eq!(charge_upload(Some(&mut sub), now), Ok(()));
        assert_eq!(sub.chapters_uploaded_this_month, 1);
        assert_eq!(sub.last_upload_reset_date, now);
    }

    #[test]
    fn same_month_of_another_year_still_resets() {
        let now = at(2027, 3, 5);
        let mut sub = subscription(10, 10, at(2026, 3, 5));
        assert!(sub.needs_reset(now));
        assert_eq!(charge_upload(Some(&mut sub), now), Ok(()));
        assert_eq!(sub.chapters_uploaded_this_month, 1);
    }

    #[test]
    fn inactive_subscription_is_rejected_like_a_missing_one() {
        let now = at(2026, 3, 10);
        for status in [
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Expired,
            SubscriptionStatus::PaymentFailed,
        ] {
            let mut sub = subscription(0, 10, at(2026, 3, 1));
            sub.status = status;
            assert_eq!(
                charge_upload(Some(&mut sub), now),
                Err(QuotaError::SubscriptionRequired)
            );
            assert_eq!(sub.chapters_uploaded_this_month, 0);
            assert_eq!(entitlement_state(Some(&sub), now), EntitlementState::Inactive);
        }
    }

    #[test]
    fn subscription_past_end_date_is_inactive() {
        let now = at(2026, 3, 10);
        let mut sub = subscription(0, 10, at(2026, 3, 1));
        sub.end_date = Some(at(2026, 3, 9));
        assert_eq!(
            charge_upload(Some(&mut sub), now),
            Err(QuotaError::SubscriptionRequired)
        );
    }

    #[test]
    fn usage_view_applies_month_rollover_without_mutating() {
        let sub = subscription(7, 10, at(2026, 2, 14));
        let now = at(2026, 3, 1);
        assert_eq!(sub.used_this_month(now), 0);
        assert_eq!(sub.remaining(now), 10);
        assert_eq!(sub.chapters_uploaded_this_month, 7);
        assert_eq!(entitlement_state(Some(&sub), now), EntitlementState::ActiveUnderLimit);
    }
}
