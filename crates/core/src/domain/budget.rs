use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, ValidationError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BudgetId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

/// The authoritative budget row for one (department, fiscal year) pair.
///
/// All three figures are mutated exclusively through [`Budget::reserve`],
/// [`Budget::commit`], and [`Budget::release`], each of which checks its
/// precondition before touching any field, so a failed call leaves the
/// value exactly as it was. The row invariant holds at every observable
/// point: `total_amount >= current_usage + reserved_amount >= 0`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub department_id: DepartmentId,
    pub fiscal_year: i32,
    pub total_amount: Decimal,
    pub current_usage: Decimal,
    pub reserved_amount: Decimal,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn new(
        department_id: DepartmentId,
        fiscal_year: i32,
        total_amount: Decimal,
    ) -> Result<Self, DomainError> {
        if total_amount < Decimal::ZERO {
            return Err(ValidationError::NegativeBudgetTotal.into());
        }

        let now = Utc::now();
        Ok(Self {
            id: BudgetId(Uuid::new_v4().to_string()),
            department_id,
            fiscal_year,
            total_amount,
            current_usage: Decimal::ZERO,
            reserved_amount: Decimal::ZERO,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn available_amount(&self) -> Decimal {
        self.total_amount - self.current_usage - self.reserved_amount
    }

    pub fn usage_percentage(&self) -> Decimal {
        if self.total_amount.is_zero() {
            return Decimal::ZERO;
        }
        self.current_usage / self.total_amount * Decimal::ONE_HUNDRED
    }

    /// Place a hold on `amount` of the remaining budget.
    pub fn reserve(&mut self, amount: Decimal) -> Result<(), DomainError> {
        check_positive_amount("reserve", amount)?;

        let available = self.available_amount();
        if amount > available {
            return Err(DomainError::InsufficientBudget { requested: amount, available });
        }

        self.reserved_amount += amount;
        Ok(())
    }

    /// Convert a previously reserved `amount` into consumed budget.
    pub fn commit(&mut self, amount: Decimal) -> Result<(), DomainError> {
        check_positive_amount("commit", amount)?;
        self.check_reserved_covers("commit", amount)?;

        self.reserved_amount -= amount;
        self.current_usage += amount;
        Ok(())
    }

    /// Return a previously reserved `amount` to the available pool.
    pub fn release(&mut self, amount: Decimal) -> Result<(), DomainError> {
        check_positive_amount("release", amount)?;
        self.check_reserved_covers("release", amount)?;

        self.reserved_amount -= amount;
        Ok(())
    }

    pub fn status(&self) -> BudgetStatus {
        BudgetStatus {
            department_id: self.department_id.clone(),
            fiscal_year: self.fiscal_year,
            total_amount: self.total_amount,
            current_usage: self.current_usage,
            reserved_amount: self.reserved_amount,
            available_amount: self.available_amount(),
        }
    }

    fn check_reserved_covers(&self, operation: &str, amount: Decimal) -> Result<(), DomainError> {
        if amount > self.reserved_amount {
            return Err(DomainError::InvariantViolation(format!(
                "{operation} of {amount} exceeds reserved amount {} for department `{}` fiscal year {}",
                self.reserved_amount, self.department_id.0, self.fiscal_year
            )));
        }
        Ok(())
    }
}

fn check_positive_amount(operation: &str, amount: Decimal) -> Result<(), DomainError> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::InvariantViolation(format!(
            "{operation} amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

/// Read snapshot of a budget row, as exposed to reporting callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub department_id: DepartmentId,
    pub fiscal_year: i32,
    pub total_amount: Decimal,
    pub current_usage: Decimal,
    pub reserved_amount: Decimal,
    pub available_amount: Decimal,
}

impl BudgetStatus {
    pub fn usage_percentage(&self) -> Decimal {
        if self.total_amount.is_zero() {
            return Decimal::ZERO;
        }
        self.current_usage / self.total_amount * Decimal::ONE_HUNDRED
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Budget, DepartmentId};
    use crate::errors::{DomainError, ValidationError};

    fn budget(total: i64) -> Budget {
        Budget::new(DepartmentId("engineering".to_string()), 2026, Decimal::new(total, 2))
            .expect("valid budget")
    }

    fn invariant_holds(budget: &Budget) -> bool {
        budget.current_usage >= Decimal::ZERO
            && budget.reserved_amount >= Decimal::ZERO
            && budget.total_amount >= budget.current_usage + budget.reserved_amount
    }

    #[test]
    fn new_budget_rejects_negative_total() {
        let error = Budget::new(
            DepartmentId("engineering".to_string()),
            2026,
            Decimal::new(-1, 0),
        )
        .expect_err("negative total must be rejected");

        assert_eq!(
            error,
            DomainError::Validation(ValidationError::NegativeBudgetTotal)
        );
    }

    #[test]
    fn reserve_holds_funds_and_reduces_available() {
        let mut budget = budget(1_000_000_00);

        budget.reserve(Decimal::new(300_000_00, 2)).expect("reserve");

        assert_eq!(budget.reserved_amount, Decimal::new(300_000_00, 2));
        assert_eq!(budget.available_amount(), Decimal::new(700_000_00, 2));
        assert!(invariant_holds(&budget));
    }

    #[test]
    fn reserve_beyond_available_fails_without_mutation() {
        let mut budget = budget(100_000_00);
        let before = budget.clone();

        let error = budget.reserve(Decimal::new(150_000_00, 2)).expect_err("over-reserve");

        assert_eq!(
            error,
            DomainError::InsufficientBudget {
                requested: Decimal::new(150_000_00, 2),
                available: Decimal::new(100_000_00, 2),
            }
        );
        assert_eq!(budget, before);
    }

    #[test]
    fn reserve_then_release_restores_prior_figures() {
        let mut budget = budget(500_000_00);
        budget.reserve(Decimal::new(120_000_00, 2)).expect("first reserve");
        let held = budget.clone();

        budget.reserve(Decimal::new(80_000_00, 2)).expect("second reserve");
        budget.release(Decimal::new(80_000_00, 2)).expect("release");

        assert_eq!(budget.reserved_amount, held.reserved_amount);
        assert_eq!(budget.available_amount(), held.available_amount());
    }

    #[test]
    fn commit_moves_funds_from_reserved_to_usage() {
        let mut budget = budget(1_000_000_00);
        budget.reserve(Decimal::new(300_000_00, 2)).expect("reserve");
        let held_total = budget.current_usage + budget.reserved_amount;

        budget.commit(Decimal::new(300_000_00, 2)).expect("commit");

        assert_eq!(budget.current_usage, Decimal::new(300_000_00, 2));
        assert_eq!(budget.reserved_amount, Decimal::ZERO);
        assert_eq!(budget.current_usage + budget.reserved_amount, held_total);
        assert_eq!(budget.available_amount(), Decimal::new(700_000_00, 2));
        assert!(invariant_holds(&budget));
    }

    #[test]
    fn commit_beyond_reserved_is_an_invariant_violation() {
        let mut budget = budget(1_000_000_00);
        budget.reserve(Decimal::new(100_00, 2)).expect("reserve");
        let before = budget.clone();

        let error = budget.commit(Decimal::new(200_00, 2)).expect_err("over-commit");

        assert!(matches!(error, DomainError::InvariantViolation(_)));
        assert_eq!(budget, before);
    }

    #[test]
    fn release_beyond_reserved_is_an_invariant_violation() {
        let mut budget = budget(1_000_000_00);
        let before = budget.clone();

        let error = budget.release(Decimal::new(1_00, 2)).expect_err("nothing reserved");

        assert!(matches!(error, DomainError::InvariantViolation(_)));
        assert_eq!(budget, before);
    }

    #[test]
    fn non_positive_amounts_are_rejected_by_every_operation() {
        let mut budget = budget(1_000_00);

        assert!(budget.reserve(Decimal::ZERO).is_err());
        assert!(budget.commit(Decimal::new(-5, 0)).is_err());
        assert!(budget.release(Decimal::ZERO).is_err());
    }

    #[test]
    fn invariant_holds_across_operation_sequences() {
        let mut budget = budget(1_000_00);
        let steps: [(&str, i64); 7] = [
            ("reserve", 400_00),
            ("reserve", 300_00),
            ("commit", 400_00),
            ("release", 300_00),
            ("reserve", 600_00),
            ("commit", 100_00),
            ("release", 500_00),
        ];

        for (op, cents) in steps {
            let amount = Decimal::new(cents, 2);
            let result = match op {
                "reserve" => budget.reserve(amount),
                "commit" => budget.commit(amount),
                _ => budget.release(amount),
            };
            result.expect(op);
            assert!(invariant_holds(&budget), "invariant broken after {op} {amount}");
        }

        assert_eq!(budget.current_usage, Decimal::new(500_00, 2));
        assert_eq!(budget.reserved_amount, Decimal::ZERO);
    }

    #[test]
    fn usage_percentage_reflects_committed_share() {
        let mut budget = budget(1_000_00);
        budget.reserve(Decimal::new(250_00, 2)).expect("reserve");
        budget.commit(Decimal::new(250_00, 2)).expect("commit");

        assert_eq!(budget.usage_percentage(), Decimal::new(25, 0));
        assert_eq!(budget.status().usage_percentage(), Decimal::new(25, 0));
    }

    #[test]
    fn zero_total_budget_reports_zero_usage_percentage() {
        let budget =
            Budget::new(DepartmentId("facilities".to_string()), 2026, Decimal::ZERO)
                .expect("zero budget");

        assert_eq!(budget.usage_percentage(), Decimal::ZERO);
    }
}
