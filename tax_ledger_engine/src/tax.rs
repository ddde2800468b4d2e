//! The tax-category breakdown collaborator.
//!
//! The breakdown calculation itself lives elsewhere in the application; the engine only defines the seam and stores
//! whatever the calculator returns, verbatim, on the transaction record.

use serde::{Deserialize, Serialize};
use stt_common::MoneyMinor;

use crate::db_types::Jurisdiction;

/// A raw tax-line entry as the platform reports it on an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTaxLine {
    pub category: String,
    pub rate: f64,
    pub amount: MoneyMinor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTax {
    pub category: String,
    pub amount: MoneyMinor,
}

/// The normalized per-category breakdown plus the validation signal: does the breakdown sum match the reported
/// total within one minor unit? Category amounts are derived from floating-point rates upstream, so a one-unit
/// rounding difference is expected and tolerated; anything larger flags the row for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub breakdown: Vec<CategoryTax>,
    pub validated: bool,
}

impl TaxSummary {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

pub trait TaxCalculator: Send + Sync {
    /// Called once per ingested event or import row.
    fn summarize(&self, lines: &[RawTaxLine], jurisdiction: &Jurisdiction, reported_total: MoneyMinor) -> TaxSummary;
}

/// Default calculator: groups tax lines by category title and validates the sum against the reported total.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryMapCalculator;

impl TaxCalculator for CategoryMapCalculator {
    fn summarize(&self, lines: &[RawTaxLine], _jurisdiction: &Jurisdiction, reported_total: MoneyMinor) -> TaxSummary {
        let mut breakdown: Vec<CategoryTax> = Vec::new();
        for line in lines {
            match breakdown.iter_mut().find(|c| c.category == line.category) {
                Some(entry) => entry.amount = entry.amount + line.amount,
                None => breakdown.push(CategoryTax { category: line.category.clone(), amount: line.amount }),
            }
        }
        let sum: MoneyMinor = breakdown.iter().map(|c| c.amount).sum();
        let validated = (sum.value() - reported_total.value()).abs() <= 1;
        TaxSummary { breakdown, validated }
    }
}
