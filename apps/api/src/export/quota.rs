//! Quota/Subscription Service — resolves a user's plan, maps it to export
//! limits, and enforces/records usage.
//!
//! Two windowing mechanisms coexist on purpose: the enforcement check counts
//! completed exports in a trailing 30-day window, while the usage counter is
//! bucketed by calendar month. They can disagree across a month boundary;
//! the original behavior is preserved rather than reconciled.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::config::{ExportConfig, ExportLimits};
use crate::errors::ExportError;
use crate::export::store::ExportStore;
use crate::models::export::SubscriptionPlan;

/// Denormalized subscription snapshot read from the user record.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub is_subscribed: bool,
    pub plan: SubscriptionPlan,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SubscriptionInfo {
    fn free() -> Self {
        SubscriptionInfo {
            is_subscribed: false,
            plan: SubscriptionPlan::Free,
            expires_at: None,
        }
    }
}

/// Result of an export-limit check.
#[derive(Debug, Clone, Serialize)]
pub struct LimitCheck {
    pub can_export: bool,
    pub reason: &'static str,
    pub limit: Option<i64>,
    pub used: Option<i64>,
    pub remaining: Option<i64>,
}

/// Projection for `GET /export/limits`.
#[derive(Debug, Clone, Serialize)]
pub struct LimitsInfo {
    pub subscription: SubscriptionInfo,
    pub limits: LimitsBlock,
    pub current_usage: UsageBlock,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitsBlock {
    pub monthly_exports: serde_json::Value,
    pub file_size_mb: u64,
    pub export_expiry_hours: i64,
    pub bulk_export_enabled: bool,
    pub max_bulk_resumes: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageBlock {
    pub monthly_exports: i64,
    pub monthly_remaining: serde_json::Value,
    pub can_export: bool,
}

pub struct SubscriptionService {
    store: Arc<dyn ExportStore>,
    config: ExportConfig,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn ExportStore>, config: ExportConfig) -> Self {
        SubscriptionService { store, config }
    }

    /// Reads the user's subscription block. A subscription past its
    /// `expires_at` silently downgrades to free; a missing user is free.
    /// Read failures fail safe to the free plan rather than blocking the
    /// request path.
    pub async fn subscription(&self, user_id: Uuid) -> SubscriptionInfo {
        let user = match self.store.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return SubscriptionInfo::free(),
            Err(e) => {
                warn!("Error getting subscription status for user {user_id}: {e}");
                return SubscriptionInfo::free();
            }
        };

        let mut is_active = user.subscription_active;
        let mut plan = SubscriptionPlan::parse_or_free(&user.subscription_plan);

        if let Some(expires_at) = user.subscription_expires_at {
            if expires_at < Utc::now() {
                is_active = false;
                plan = SubscriptionPlan::Free;
            }
        }

        SubscriptionInfo {
            is_subscribed: is_active && plan != SubscriptionPlan::Free,
            plan,
            expires_at: user.subscription_expires_at,
        }
    }

    /// Checks whether the user may start another export. Unlimited plans
    /// short-circuit; limited plans count completed exports in the trailing
    /// 30 days. A failed count fails open (export allowed, reason recorded).
    pub async fn check_export_limits(
        &self,
        user_id: Uuid,
        subscription: &SubscriptionInfo,
    ) -> LimitCheck {
        let limits = self.config.limits_for(subscription.plan);
        if limits.is_unlimited() {
            return LimitCheck {
                can_export: true,
                reason: "unlimited",
                limit: None,
                used: None,
                remaining: None,
            };
        }

        let thirty_days_ago = Utc::now() - Duration::days(30);
        match self
            .store
            .count_completed_since(user_id, thirty_days_ago)
            .await
        {
            Ok(used) => evaluate_limit(&limits, used),
            Err(e) => {
                warn!("Error checking export limits for user {user_id}: {e}");
                LimitCheck {
                    can_export: true,
                    reason: "check_failed",
                    limit: None,
                    used: None,
                    remaining: None,
                }
            }
        }
    }

    /// Bulk export is plan-gated: the plan must have bulk enabled and the
    /// request must fit under its per-job resume cap.
    pub async fn validate_bulk_permission(&self, user_id: Uuid, resume_count: usize) -> bool {
        let subscription = self.subscription(user_id).await;
        let limits = self.config.limits_for(subscription.plan);
        limits.bulk_export_enabled && resume_count <= limits.max_bulk_resumes as usize
    }

    pub async fn is_admin(&self, user_id: Uuid) -> bool {
        match self.store.get_user(user_id).await {
            Ok(Some(user)) => user.is_admin,
            Ok(None) => false,
            Err(e) => {
                warn!("Error checking admin status for user {user_id}: {e}");
                false
            }
        }
    }

    /// Records one export against the user's calendar-month counter.
    /// Tracking failures are logged, never surfaced — usage accounting must
    /// not fail an export that already passed its limit check.
    pub async fn increment_usage(&self, user_id: Uuid) {
        let now = Utc::now();
        if let Err(e) = self
            .store
            .increment_usage(user_id, month_bucket(now), now)
            .await
        {
            warn!("Error incrementing export usage for user {user_id}: {e}");
        }
    }

    pub async fn monthly_usage(&self, user_id: Uuid) -> i64 {
        match self
            .store
            .monthly_usage(user_id, month_bucket(Utc::now()))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("Error getting monthly usage for user {user_id}: {e}");
                0
            }
        }
    }

    /// Full limits + usage projection for `GET /export/limits`.
    pub async fn limits_info(&self, user_id: Uuid) -> Result<LimitsInfo, ExportError> {
        let subscription = self.subscription(user_id).await;
        let limits = self.config.limits_for(subscription.plan);
        let monthly_usage = self.monthly_usage(user_id).await;

        let (monthly_exports, monthly_remaining, can_export) = if limits.is_unlimited() {
            (
                serde_json::Value::from("unlimited"),
                serde_json::Value::from("unlimited"),
                true,
            )
        } else {
            (
                serde_json::Value::from(limits.monthly_exports),
                serde_json::Value::from((limits.monthly_exports - monthly_usage).max(0)),
                monthly_usage < limits.monthly_exports,
            )
        };

        Ok(LimitsInfo {
            subscription,
            limits: LimitsBlock {
                monthly_exports,
                file_size_mb: limits.file_size_mb,
                export_expiry_hours: limits.export_expiry_hours,
                bulk_export_enabled: limits.bulk_export_enabled,
                max_bulk_resumes: limits.max_bulk_resumes,
            },
            current_usage: UsageBlock {
                monthly_exports: monthly_usage,
                monthly_remaining,
                can_export,
            },
        })
    }
}

/// First day of the month containing `now` — the usage counter key.
pub fn month_bucket(now: DateTime<Utc>) -> NaiveDate {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .unwrap_or_else(|| now.date_naive())
}

/// Pure limit arithmetic over an already-counted usage figure.
pub fn evaluate_limit(limits: &ExportLimits, used: i64) -> LimitCheck {
    if used >= limits.monthly_exports {
        LimitCheck {
            can_export: false,
            reason: "limit_reached",
            limit: Some(limits.monthly_exports),
            used: Some(used),
            remaining: Some(0),
        }
    } else {
        LimitCheck {
            can_export: true,
            reason: "within_limit",
            limit: Some(limits.monthly_exports),
            used: Some(used),
            remaining: Some(limits.monthly_exports - used),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::store::testing::MemoryExportStore;
    use crate::models::user::UserRow;
    use chrono::TimeZone;

    fn user(plan: &str, active: bool, expires_at: Option<DateTime<Utc>>) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            is_admin: false,
            subscription_plan: plan.to_string(),
            subscription_active: active,
            subscription_expires_at: expires_at,
            created_at: Utc::now(),
        }
    }

    fn service(store: Arc<MemoryExportStore>) -> SubscriptionService {
        SubscriptionService::new(store, ExportConfig::default())
    }

    #[test]
    fn test_month_bucket_is_first_of_month() {
        let now = Utc.with_ymd_and_hms(2024, 7, 19, 13, 45, 0).unwrap();
        assert_eq!(
            month_bucket(now),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
        );
    }

    #[test]
    fn test_evaluate_limit_at_and_below_quota() {
        let limits = ExportConfig::default().limits_for(SubscriptionPlan::Free);

        let under = evaluate_limit(&limits, 2);
        assert!(under.can_export);
        assert_eq!(under.reason, "within_limit");
        assert_eq!(under.remaining, Some(1));

        let at = evaluate_limit(&limits, 3);
        assert!(!at.can_export);
        assert_eq!(at.reason, "limit_reached");
        assert_eq!(at.limit, Some(3));
        assert_eq!(at.used, Some(3));
    }

    #[tokio::test]
    async fn test_missing_user_is_free_plan() {
        let store = Arc::new(MemoryExportStore::new());
        let svc = service(store);
        let sub = svc.subscription(Uuid::new_v4()).await;
        assert_eq!(sub.plan, SubscriptionPlan::Free);
        assert!(!sub.is_subscribed);
    }

    #[tokio::test]
    async fn test_expired_subscription_downgrades_to_free() {
        let store = Arc::new(MemoryExportStore::new());
        let expired = user(
            "premium",
            true,
            Some(Utc::now() - Duration::hours(1)),
        );
        let user_id = expired.id;
        store.add_user(expired);

        let svc = service(store);
        let sub = svc.subscription(user_id).await;
        assert_eq!(sub.plan, SubscriptionPlan::Free);
        assert!(!sub.is_subscribed);
    }

    #[tokio::test]
    async fn test_active_premium_subscription() {
        let store = Arc::new(MemoryExportStore::new());
        let premium = user("premium", true, Some(Utc::now() + Duration::days(30)));
        let user_id = premium.id;
        store.add_user(premium);

        let svc = service(store);
        let sub = svc.subscription(user_id).await;
        assert_eq!(sub.plan, SubscriptionPlan::Premium);
        assert!(sub.is_subscribed);
    }

    #[tokio::test]
    async fn test_enterprise_limit_check_short_circuits() {
        let store = Arc::new(MemoryExportStore::new());
        let svc = service(store);
        let sub = SubscriptionInfo {
            is_subscribed: true,
            plan: SubscriptionPlan::Enterprise,
            expires_at: None,
        };
        let check = svc.check_export_limits(Uuid::new_v4(), &sub).await;
        assert!(check.can_export);
        assert_eq!(check.reason, "unlimited");
    }

    #[tokio::test]
    async fn test_bulk_permission_denied_for_free_and_oversized_requests() {
        let store = Arc::new(MemoryExportStore::new());
        let free_user = user("free", false, None);
        let premium_user = user("premium", true, None);
        let free_id = free_user.id;
        let premium_id = premium_user.id;
        store.add_user(free_user);
        store.add_user(premium_user);

        let svc = service(store);
        assert!(!svc.validate_bulk_permission(free_id, 2).await);
        assert!(svc.validate_bulk_permission(premium_id, 20).await);
        assert!(!svc.validate_bulk_permission(premium_id, 21).await);
    }

    #[tokio::test]
    async fn test_usage_counter_increments_in_month_bucket() {
        let store = Arc::new(MemoryExportStore::new());
        let svc = service(store.clone());
        let user_id = Uuid::new_v4();

        assert_eq!(svc.monthly_usage(user_id).await, 0);
        svc.increment_usage(user_id).await;
        svc.increment_usage(user_id).await;
        assert_eq!(svc.monthly_usage(user_id).await, 2);
    }
}
