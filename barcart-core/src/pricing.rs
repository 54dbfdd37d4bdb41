use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cart::{CartItem, ShippingAddress};
use crate::money::Cents;
use crate::BoxError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaxLine {
    pub name: String,
    pub rate: f64,
    pub amount_cents: Cents,
}

/// Authoritative tax for a whole order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaxQuote {
    pub tax_cents: Cents,
    pub rate: f64,
    pub breakdown: Vec<TaxLine>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeeSource {
    Global,
    State,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub source: FeeSource,
    pub state: Option<String>,
    pub percent: f64,
    pub percent_cents: Cents,
    pub fixed_cents: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub commission_cents: Cents,
    pub breakdown: FeeBreakdown,
}

#[async_trait]
pub trait TaxCalculator: Send + Sync {
    async fn calculate(
        &self,
        items: &[CartItem],
        subtotal_cents: Cents,
        address: &ShippingAddress,
    ) -> Result<TaxQuote, BoxError>;
}

#[async_trait]
pub trait FeeCalculator: Send + Sync {
    /// Marketplace commission on `amount_cents` for a buyer in `state`
    async fn platform_fee(
        &self,
        amount_cents: Cents,
        state: Option<&str>,
    ) -> Result<FeeQuote, BoxError>;
}
