//! Valuation and taxation engine

pub mod config;
pub mod conversion;
pub mod error;
pub mod log;
pub mod money;
pub mod price;
pub mod rate;
pub mod report;
pub mod resolver;
pub mod tax;

// Re-export main types for cleaner imports
pub use conversion::CurrencyConversionPipeline;
pub use error::{Error, Result};
pub use price::PriceOracle;
pub use rate::{CurrencyPair, ExchangeRate, RateSource, SourceKind};
pub use report::{PortfolioValuer, TaxReportBuilder, TaxReportRow};
pub use resolver::{ExchangeRateResolver, PreloadStats};
pub use tax::{CostBasisTaxEngine, FiatOperation, OperationType, TaxCalculation};
