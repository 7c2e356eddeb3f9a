//! Plan catalog and trial policy.
//!
//! Both are reference data decided at startup and shared read-only. The
//! trial module set lives here rather than in code so a deployment can
//! change what a trial includes without a release.

use kadro_storage::{Plan, PlanId};

/// Immutable set of purchasable plans plus the trial entitlement set.
#[derive(Clone, Debug)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
    trial_modules: Vec<String>,
}

impl PlanCatalog {
    pub fn new(plans: Vec<Plan>, trial_modules: Vec<String>) -> Self {
        Self {
            plans,
            trial_modules,
        }
    }

    pub fn get(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == *id)
    }

    /// Look a plan up by its code. Marketplace purchases carry the plan
    /// code, not our internal id.
    pub fn get_by_code(&self, code: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.code == code)
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    /// Whether a module is part of the trial entitlement set.
    pub fn trial_includes(&self, feature_code: &str) -> bool {
        self.trial_modules.iter().any(|m| m == feature_code)
    }

    pub fn trial_modules(&self) -> &[String] {
        &self.trial_modules
    }
}

/// Trial duration and reminder policy.
#[derive(Clone, Copy, Debug)]
pub struct TrialPolicy {
    /// How long a self-signup trial lasts.
    pub trial_days: i64,
    /// How far before expiry the "ending soon" notification fires.
    pub reminder_days: i64,
}

impl Default for TrialPolicy {
    fn default() -> Self {
        Self {
            trial_days: 7,
            reminder_days: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadro_storage::{BillingCycle, PlanLimits};
    use uuid::Uuid;

    fn plan(code: &str, modules: &[&str]) -> Plan {
        Plan {
            id: PlanId(Uuid::new_v4()),
            code: code.into(),
            billing_cycle: BillingCycle::Monthly,
            modules: modules.iter().map(|m| m.to_string()).collect(),
            limits: PlanLimits {
                max_users: 50,
                storage_gb: 20,
                api_calls_per_month: 100_000,
            },
            rate_limit_tier: 1,
        }
    }

    #[test]
    fn test_lookup_by_code_and_id() {
        let starter = plan("starter", &["career_progression"]);
        let starter_id = starter.id;
        let catalog = PlanCatalog::new(
            vec![starter, plan("pro", &["career_progression", "performance"])],
            vec!["career_progression".into()],
        );

        assert_eq!(catalog.get_by_code("pro").unwrap().code, "pro");
        assert_eq!(catalog.get(&starter_id).unwrap().code, "starter");
        assert!(catalog.get_by_code("enterprise").is_none());
    }

    #[test]
    fn test_trial_set() {
        let catalog = PlanCatalog::new(vec![], vec!["career_progression".into()]);
        assert!(catalog.trial_includes("career_progression"));
        assert!(!catalog.trial_includes("payroll"));
    }

    #[test]
    fn test_default_trial_policy() {
        let policy = TrialPolicy::default();
        assert_eq!(policy.trial_days, 7);
        assert_eq!(policy.reminder_days, 2);
    }
}
