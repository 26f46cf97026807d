//! Proportional cost-basis computation for the French flat tax

use crate::core::error::{Error, Result};
use crate::core::money::round2;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    #[serde(alias = "Dépôt")]
    Deposit,
    #[serde(alias = "Retrait")]
    Withdrawal,
}

impl Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Deposit => write!(f, "Deposit"),
            OperationType::Withdrawal => write!(f, "Withdrawal"),
        }
    }
}

/// A fiat deposit or withdrawal, in EUR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiatOperation {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub amount: Decimal,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Engine state after one operation. Amounts are rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxCalculation {
    pub acquisition_cost: Decimal,
    pub taxable_gain: Decimal,
    pub cumulative_gains: Decimal,
    /// Share of the portfolio withdrawn; `None` for deposits
    pub withdrawal_ratio: Option<Decimal>,
    /// Set when a withdrawal exceeded the declared portfolio value
    pub exceeds_portfolio: bool,
}

/// Tracks acquisition cost and realised gains across a chronological run of
/// fiat operations.
///
/// Each withdrawal releases `acquisition_cost × amount / portfolio_value` of
/// cost basis; the rest of the amount is a taxable gain. Every intermediate
/// value is rounded half-up to two decimals before it is used further.
#[derive(Debug, Default)]
pub struct CostBasisTaxEngine {
    acquisition_cost: Decimal,
    cumulative_gains: Decimal,
    last_timestamp: Option<i64>,
}

impl CostBasisTaxEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquisition_cost(&self) -> Decimal {
        self.acquisition_cost
    }

    pub fn cumulative_gains(&self) -> Decimal {
        self.cumulative_gains
    }

    pub fn process_deposit(&mut self, amount: Decimal) -> Result<TaxCalculation> {
        debug!("Processing deposit: €{}", amount);
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "Deposit amount must be positive, got: €{amount}"
            )));
        }

        self.acquisition_cost = round2(self.acquisition_cost + amount);
        debug!("New acquisition cost: €{}", self.acquisition_cost);

        Ok(TaxCalculation {
            acquisition_cost: self.acquisition_cost,
            taxable_gain: Decimal::ZERO,
            cumulative_gains: self.cumulative_gains,
            withdrawal_ratio: None,
            exceeds_portfolio: false,
        })
    }

    /// `portfolio_value_before` is the EUR value of the whole portfolio just
    /// before the withdrawal, the withdrawn amount included.
    pub fn process_withdrawal(
        &mut self,
        amount: Decimal,
        portfolio_value_before: Decimal,
    ) -> Result<TaxCalculation> {
        debug!(
            "Processing withdrawal: €{}, portfolio value: €{}",
            amount, portfolio_value_before
        );
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "Withdrawal amount must be positive, got: €{amount}"
            )));
        }
        if portfolio_value_before <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "Portfolio value must be positive, got: €{portfolio_value_before}"
            )));
        }

        let exceeds_portfolio = amount > portfolio_value_before;
        if exceeds_portfolio {
            warn!(
                "Withdrawal amount (€{}) exceeds portfolio value (€{})",
                amount, portfolio_value_before
            );
        }

        let ratio = amount / portfolio_value_before;
        let cost_portion = round2(self.acquisition_cost * ratio);
        let taxable_gain = round2(amount - cost_portion);

        self.acquisition_cost = round2(self.acquisition_cost - cost_portion);
        if self.acquisition_cost < Decimal::ZERO {
            warn!(
                "Acquisition cost went negative (€{}), setting to 0",
                self.acquisition_cost
            );
            self.acquisition_cost = Decimal::ZERO;
        }
        self.cumulative_gains = round2(self.cumulative_gains + taxable_gain);
        debug!(
            "Taxable gain: €{}, new acquisition cost: €{}, cumulative gains: €{}",
            taxable_gain, self.acquisition_cost, self.cumulative_gains
        );

        Ok(TaxCalculation {
            acquisition_cost: self.acquisition_cost,
            taxable_gain,
            cumulative_gains: self.cumulative_gains,
            withdrawal_ratio: Some(ratio),
            exceeds_portfolio,
        })
    }

    /// Applies `operation`, refusing anything older than the last processed
    /// operation. Withdrawals require `portfolio_value_before`.
    pub fn process(
        &mut self,
        operation: &FiatOperation,
        portfolio_value_before: Option<Decimal>,
    ) -> Result<TaxCalculation> {
        if let Some(last) = self.last_timestamp {
            if operation.timestamp < last {
                return Err(Error::OutOfOrder {
                    timestamp: operation.timestamp,
                    last,
                });
            }
        }

        let result = match operation.kind {
            OperationType::Deposit => self.process_deposit(operation.amount),
            OperationType::Withdrawal => {
                let value = portfolio_value_before.ok_or_else(|| {
                    Error::InvalidAmount(format!(
                        "Withdrawal on {} needs the portfolio value",
                        operation.date
                    ))
                })?;
                self.process_withdrawal(operation.amount, value)
            }
        }?;
        self.last_timestamp = Some(operation.timestamp);
        Ok(result)
    }
}
