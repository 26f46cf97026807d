//! Per-operation tax report rows

use crate::core::conversion::CurrencyConversionPipeline;
use crate::core::error::{Error, Result};
use crate::core::money::round2;
use crate::core::rate::CurrencyPair;
use crate::core::resolver::ManualRate;
use crate::core::tax::{CostBasisTaxEngine, FiatOperation, OperationType};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Values the whole portfolio in USD just before an operation.
#[async_trait]
pub trait PortfolioValuer: Send + Sync {
    async fn portfolio_value_usd(&self, operation: &FiatOperation) -> Result<Decimal>;
}

/// Valuations recorded ahead of time, keyed by operation timestamp.
#[derive(Debug, Default)]
pub struct RecordedValuations {
    values: HashMap<i64, Decimal>,
}

impl RecordedValuations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, timestamp: i64, value_usd: Decimal) {
        self.values.insert(timestamp, value_usd);
    }
}

#[async_trait]
impl PortfolioValuer for RecordedValuations {
    async fn portfolio_value_usd(&self, operation: &FiatOperation) -> Result<Decimal> {
        self.values.get(&operation.timestamp).copied().ok_or_else(|| {
            Error::InvalidAmount(format!(
                "No portfolio valuation recorded for the operation of {}",
                operation.date
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxReportRow {
    pub date: NaiveDate,
    pub kind: OperationType,
    pub amount_eur: Decimal,
    pub portfolio_value_usd: Decimal,
    /// USD/EUR rate for the operation date
    pub exchange_rate: Decimal,
    /// Only computed for withdrawals
    pub portfolio_value_eur: Option<Decimal>,
    pub acquisition_cost: Decimal,
    pub taxable_gain: Decimal,
    pub cumulative_gains: Decimal,
    pub exceeds_portfolio: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxReportSummary {
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub total_gains: Decimal,
}

impl TaxReportSummary {
    pub fn from_rows(rows: &[TaxReportRow]) -> Self {
        let sum = |kind: OperationType| {
            rows.iter()
                .filter(|row| row.kind == kind)
                .map(|row| row.amount_eur)
                .sum::<Decimal>()
        };
        Self {
            total_deposits: sum(OperationType::Deposit),
            total_withdrawals: sum(OperationType::Withdrawal),
            total_gains: rows
                .last()
                .map(|row| row.cumulative_gains)
                .unwrap_or_default(),
        }
    }
}

/// Runs a chronological list of fiat operations through a fresh
/// [`CostBasisTaxEngine`], valuing each withdrawal's portfolio in EUR.
pub struct TaxReportBuilder<'a> {
    pipeline: &'a mut CurrencyConversionPipeline,
    manual: Option<ManualRate<'a>>,
}

impl<'a> TaxReportBuilder<'a> {
    pub fn new(pipeline: &'a mut CurrencyConversionPipeline) -> Self {
        Self {
            pipeline,
            manual: None,
        }
    }

    /// Fallback used when no source knows the USD/EUR rate of a date.
    pub fn with_manual_rate(mut self, manual: ManualRate<'a>) -> Self {
        self.manual = Some(manual);
        self
    }

    pub async fn build(
        &mut self,
        operations: &[FiatOperation],
        valuer: &dyn PortfolioValuer,
    ) -> Result<Vec<TaxReportRow>> {
        let mut engine = CostBasisTaxEngine::new();
        let mut rows = Vec::with_capacity(operations.len());
        let pair = CurrencyPair::usd_eur();

        for (idx, operation) in operations.iter().enumerate() {
            info!(
                "Processing operation {}/{}: {} - €{}",
                idx + 1,
                operations.len(),
                operation.kind,
                operation.amount
            );
            let portfolio_value_usd = valuer.portfolio_value_usd(operation).await?;
            let rate = self
                .pipeline
                .resolver_mut()
                .get_rate_with_validation(&pair, operation.date, self.manual)
                .await?;

            let portfolio_value_eur = match operation.kind {
                OperationType::Deposit => None,
                OperationType::Withdrawal => Some(round2(portfolio_value_usd * rate.rate)),
            };
            let calculation = engine.process(operation, portfolio_value_eur)?;
            debug!(
                "Tax calculation: gain=€{}, cumulative=€{}",
                calculation.taxable_gain, calculation.cumulative_gains
            );

            rows.push(TaxReportRow {
                date: operation.date,
                kind: operation.kind,
                amount_eur: operation.amount,
                portfolio_value_usd,
                exchange_rate: rate.rate,
                portfolio_value_eur,
                acquisition_cost: calculation.acquisition_cost,
                taxable_gain: calculation.taxable_gain,
                cumulative_gains: calculation.cumulative_gains,
                exceeds_portfolio: calculation.exceeds_portfolio,
            });
        }
        Ok(rows)
    }
}
