//! # Budget Controller
//!
//! Reads ledger state to answer admission queries and exposes budget CRUD.
//! Holds no parallel in-memory copy of spend: every decision is a fresh
//! snapshot read through the [`LedgerStore`].

use crate::estimator::CostEstimate;
use crate::ledger::{Budget, LedgerError, LedgerStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct RejectionDetails {
    pub current_spend_usd: f64,
    pub limit_usd: f64,
    pub estimated_cost_usd: f64,
    pub remaining_after_request_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// No budget row exists for the project: nothing gates this request.
    NoBudgetConfigured,
    /// The budget's period has lapsed; admitted anyway with an advisory.
    AdmittedPeriodExpired { budget: Budget },
    Admitted { budget: Budget },
    Rejected { details: RejectionDetails },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }
}

pub struct BudgetController {
    ledger: Arc<LedgerStore>,
}

impl BudgetController {
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Admission algorithm per the budget state machine: absent admits
    /// ungated, expired periods admit with an advisory, otherwise the
    /// estimate is compared against `limit - spent`.
    pub fn check_admission(
        &self,
        project_id: &str,
        estimate: &CostEstimate,
        now: DateTime<Utc>,
    ) -> Result<Admission, LedgerError> {
        let budget = match self.ledger.get_budget(project_id)? {
            None => return Ok(Admission::NoBudgetConfigured),
            Some(budget) => budget,
        };

        if let Some(period_end) = budget.period_end {
            if now > period_end {
                return Ok(Admission::AdmittedPeriodExpired { budget });
            }
        }

        let remaining = budget.limit_usd - budget.spent_usd;
        if estimate.total_estimated_cost_usd > remaining {
            return Ok(Admission::Rejected {
                details: RejectionDetails {
                    current_spend_usd: budget.spent_usd,
                    limit_usd: budget.limit_usd,
                    estimated_cost_usd: estimate.total_estimated_cost_usd,
                    remaining_after_request_usd: remaining - estimate.total_estimated_cost_usd,
                },
            });
        }

        Ok(Admission::Admitted { budget })
    }

    pub fn set_budget(
        &self,
        project_id: &str,
        limit_usd: f64,
        period_days: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Budget, LedgerError> {
        self.ledger.set_budget(project_id, limit_usd, period_days, now)
    }

    pub fn get_budget(&self, project_id: &str) -> Result<Option<Budget>, LedgerError> {
        self.ledger.get_budget(project_id)
    }

    pub fn reset_budget(&self, project_id: &str, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ledger.reset_budget_spent(project_id, now)
    }

    pub fn delete_budget(&self, project_id: &str) -> Result<bool, LedgerError> {
        self.ledger.delete_budget(project_id)
    }
}

/// Would admitting `cost` push total spend past the limit?
pub fn would_exceed(budget: &Budget, cost: f64) -> bool {
    budget.spent_usd + cost > budget.limit_usd
}

pub fn remaining(budget: &Budget) -> f64 {
    budget.limit_usd - budget.spent_usd
}

pub fn utilization_percent(budget: &Budget) -> f64 {
    if budget.limit_usd <= 0.0 {
        return 100.0;
    }
    (budget.spent_usd / budget.limit_usd) * 100.0
}

/// How many output tokens could still be afforded at `output_price_per_million`,
/// given `input_cost` has already been spent on this request's input tokens.
pub fn safe_max_tokens(budget: &Budget, input_cost: f64, output_price_per_million: f64) -> u64 {
    if output_price_per_million <= 0.0 {
        return u64::MAX;
    }
    let headroom = remaining(budget) - input_cost;
    if headroom <= 0.0 {
        return 0;
    }
    ((headroom * 1_000_000.0) / output_price_per_million).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::Provider;
    use crate::tokenizer::Confidence;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn estimate(cost: f64) -> CostEstimate {
        CostEstimate {
            provider: Provider::OpenAi,
            model_id: "gpt-4o".to_string(),
            input_tokens: 100,
            estimated_output_tokens: 100,
            input_cost_usd: cost / 2.0,
            estimated_output_cost_usd: cost / 2.0,
            total_estimated_cost_usd: cost,
            confidence: Confidence::High,
        }
    }

    #[test]
    fn no_budget_admits_ungated() {
        let ledger = Arc::new(LedgerStore::open_in_memory().unwrap());
        let controller = BudgetController::new(ledger);
        let admission = controller.check_admission("p3", &estimate(9999.0), now()).unwrap();
        assert_eq!(admission, Admission::NoBudgetConfigured);
    }

    #[test]
    fn exact_remaining_cost_is_admitted() {
        let ledger = Arc::new(LedgerStore::open_in_memory().unwrap());
        let controller = BudgetController::new(ledger);
        controller.set_budget("p1", 1.00, None, now()).unwrap();
        let admission = controller.check_admission("p1", &estimate(1.00), now()).unwrap();
        assert!(admission.is_admitted());
    }

    #[test]
    fn cost_over_remaining_is_rejected() {
        let ledger = Arc::new(LedgerStore::open_in_memory().unwrap());
        let controller = BudgetController::new(ledger);
        controller.set_budget("p2", 0.0001, None, now()).unwrap();
        let admission = controller.check_admission("p2", &estimate(0.01), now()).unwrap();
        match admission {
            Admission::Rejected { details } => {
                assert_eq!(details.limit_usd, 0.0001);
                assert_eq!(details.estimated_cost_usd, 0.01);
            }
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn expired_period_admits_with_advisory() {
        let ledger = Arc::new(LedgerStore::open_in_memory().unwrap());
        let controller = BudgetController::new(ledger);
        controller.set_budget("p8", 1.0, Some(1), now()).unwrap();
        let later = now() + chrono::Duration::days(2);
        let admission = controller.check_admission("p8", &estimate(0.5), later).unwrap();
        assert!(matches!(admission, Admission::AdmittedPeriodExpired { .. }));
    }

    #[test]
    fn utilization_and_remaining_helpers() {
        let budget = Budget {
            project_id: "p".to_string(),
            limit_usd: 10.0,
            spent_usd: 2.5,
            period_start: now(),
            period_end: None,
            created_at: now(),
            updated_at: now(),
        };
        assert_eq!(remaining(&budget), 7.5);
        assert_eq!(utilization_percent(&budget), 25.0);
        assert!(!would_exceed(&budget, 7.5));
        assert!(would_exceed(&budget, 7.6));
    }
}
