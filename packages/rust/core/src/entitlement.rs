//! Subscription plan and access resolution.
//!
//! The resolver only reads. A user without an `ACTIVE` subscription is on
//! the free tier; that is never an error. Storage failures propagate as-is.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use coursemind_shared::{CourseMindError, Plan, Result, Role, Subscription, User};
use coursemind_storage::Storage;

use crate::plans::PlanLimits;

/// Read access the resolver needs from persistence.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Most recently created `ACTIVE` subscription.
    async fn latest_active_subscription(&self, user_id: &str) -> Result<Option<Subscription>>;
    async fn find_user(&self, user_id: &str) -> Result<Option<User>>;
    async fn count_courses(&self, user_id: &str) -> Result<u64>;
}

#[async_trait]
impl EntitlementStore for Storage {
    async fn latest_active_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        Storage::latest_active_subscription(self, user_id).await
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        self.get_user(user_id).await
    }

    async fn count_courses(&self, user_id: &str) -> Result<u64> {
        Storage::count_courses(self, user_id).await
    }
}

/// Authorization tier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    Free,
    Paid,
    Admin,
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Free => "FREE",
            Self::Paid => "PAID",
            Self::Admin => "ADMIN",
        })
    }
}

/// A user's resolved plan, access level and limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub user_id: String,
    pub plan: Plan,
    pub access: AccessLevel,
    pub limits: PlanLimits,
}

pub struct EntitlementResolver<'a> {
    store: &'a dyn EntitlementStore,
}

impl<'a> EntitlementResolver<'a> {
    pub fn new(store: &'a dyn EntitlementStore) -> Self {
        Self { store }
    }

    pub async fn get_active_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        self.store.latest_active_subscription(user_id).await
    }

    /// Plan of the active subscription, or `FREE` when there is none.
    #[instrument(skip(self))]
    pub async fn resolve_plan(&self, user_id: &str) -> Result<Plan> {
        let plan = self
            .get_active_subscription(user_id)
            .await?
            .map(|sub| sub.plan)
            .unwrap_or(Plan::Free);
        debug!(%plan, "plan resolved");
        Ok(plan)
    }

    /// True iff an active subscription exists on a paid plan.
    pub async fn has_active_paid_plan(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .get_active_subscription(user_id)
            .await?
            .is_some_and(|sub| sub.plan.is_paid()))
    }

    /// `ADMIN` for admins, else `PAID` with an active paid plan, else `FREE`.
    pub async fn access_level(&self, user_id: &str) -> Result<AccessLevel> {
        let user = self.require_user(user_id).await?;
        self.access_for(&user).await
    }

    /// Snapshot of plan, access and limits.
    pub async fn entitlement(&self, user_id: &str) -> Result<Entitlement> {
        let user = self.require_user(user_id).await?;
        let active = self.get_active_subscription(user_id).await?;
        let plan = active.as_ref().map_or(Plan::Free, |sub| sub.plan);
        let access = access_from(&user, active.as_ref());
        Ok(Entitlement {
            user_id: user.id,
            plan,
            access,
            limits: PlanLimits::for_plan(plan),
        })
    }

    /// Fail with `QuotaExceeded` when the user already owns as many courses
    /// as their plan allows. Admins are never limited.
    #[instrument(skip(self))]
    pub async fn ensure_can_create_course(&self, user_id: &str) -> Result<Entitlement> {
        let entitlement = self.entitlement(user_id).await?;
        if entitlement.access == AccessLevel::Admin {
            return Ok(entitlement);
        }

        let owned = self.store.count_courses(user_id).await?;
        if entitlement.limits.course_limit_reached(owned) {
            debug!(owned, limit = entitlement.limits.max_courses, "course quota reached");
            return Err(CourseMindError::QuotaExceeded {
                plan: entitlement.plan.to_string(),
                limit: entitlement.limits.max_courses,
            });
        }
        Ok(entitlement)
    }

    async fn require_user(&self, user_id: &str) -> Result<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| CourseMindError::not_found("user", user_id))
    }

    async fn access_for(&self, user: &User) -> Result<AccessLevel> {
        if user.role == Role::Admin {
            return Ok(AccessLevel::Admin);
        }
        let active = self.get_active_subscription(&user.id).await?;
        Ok(access_from(user, active.as_ref()))
    }
}

fn access_from(user: &User, active: Option<&Subscription>) -> AccessLevel {
    if user.role == Role::Admin {
        AccessLevel::Admin
    } else if active.is_some_and(|sub| sub.plan.is_paid()) {
        AccessLevel::Paid
    } else {
        AccessLevel::Free
    }
}
