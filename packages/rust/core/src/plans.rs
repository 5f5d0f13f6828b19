//! Static plan table and billing price mapping.

use serde::Serialize;

use coursemind_shared::{BillingConfig, Plan};

const FREE_FEATURES: &[&str] = &[
    "Up to 3 courses",
    "AI-written theory for every topic",
    "One image or video per topic",
    "Progress tracking",
];

const PAID_FEATURES: &[&str] = &[
    "Up to 50 courses",
    "AI-written theory for every topic",
    "One image or video per topic",
    "Progress tracking",
    "AI tutor chat",
    "PDF export",
];

/// What a plan grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub plan: Plan,
    /// Maximum number of courses a user may own.
    pub max_courses: u32,
    pub features: &'static [&'static str],
}

impl PlanLimits {
    /// | Plan | Courses |
    /// |------|---------|
    /// | Free | 3 |
    /// | Monthly | 50 |
    /// | Yearly | 50 |
    pub const fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Free => Self {
                plan,
                max_courses: 3,
                features: FREE_FEATURES,
            },
            Plan::Monthly | Plan::Yearly => Self {
                plan,
                max_courses: 50,
                features: PAID_FEATURES,
            },
        }
    }

    /// Whether a user owning `current_courses` may not create another one.
    pub fn course_limit_reached(&self, current_courses: u64) -> bool {
        current_courses >= u64::from(self.max_courses)
    }
}

/// Maps billing price identifiers to the plans they sell.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    billing: BillingConfig,
}

impl PlanCatalog {
    pub fn new(billing: BillingConfig) -> Self {
        Self { billing }
    }

    pub fn plan_for_price_id(&self, price_id: &str) -> Option<Plan> {
        self.billing.plan_for_price_id(price_id)
    }

    /// The configured price for a paid plan. `FREE` has none.
    pub fn price_id_for_plan(&self, plan: Plan) -> Option<&str> {
        match plan {
            Plan::Free => None,
            Plan::Monthly => self.billing.monthly_price_id.as_deref(),
            Plan::Yearly => self.billing.yearly_price_id.as_deref(),
        }
    }

    /// Limits for every plan, cheapest first.
    pub fn all(&self) -> [PlanLimits; 3] {
        [
            PlanLimits::for_plan(Plan::Free),
            PlanLimits::for_plan(Plan::Monthly),
            PlanLimits::for_plan(Plan::Yearly),
        ]
    }
}
