use async_trait::async_trait;
use barcart_core::money::percent_of;
use barcart_core::pricing::{TaxCalculator, TaxLine, TaxQuote};
use barcart_core::{BoxError, CartItem, Cents, ShippingAddress};
use std::collections::HashMap;

/// Destination-based sales tax with an optional alcohol surcharge per state.
/// Rates are percentages.
#[derive(Debug, Clone)]
pub struct StateTaxTable {
    default_rate: f64,
    state_rates: HashMap<String, f64>,
    alcohol_surcharge_rates: HashMap<String, f64>,
}

impl StateTaxTable {
    pub fn new(default_rate: f64) -> Self {
        Self {
            default_rate,
            state_rates: HashMap::new(),
            alcohol_surcharge_rates: HashMap::new(),
        }
    }

    pub fn with_state_rates(mut self, rates: HashMap<String, f64>) -> Self {
        self.state_rates = upper_keys(rates);
        self
    }

    pub fn with_alcohol_surcharges(mut self, rates: HashMap<String, f64>) -> Self {
        self.alcohol_surcharge_rates = upper_keys(rates);
        self
    }

    pub fn quote(&self, items: &[CartItem], subtotal_cents: Cents, address: &ShippingAddress) -> TaxQuote {
        let state = address.state_code();
        let rate = state
            .as_ref()
            .and_then(|s| self.state_rates.get(s))
            .copied()
            .unwrap_or(self.default_rate);

        let sales = percent_of(subtotal_cents, rate);
        let mut breakdown = vec![TaxLine {
            name: "Sales tax".to_string(),
            rate,
            amount_cents: sales,
        }];

        let surcharge_rate = state
            .as_ref()
            .and_then(|s| self.alcohol_surcharge_rates.get(s))
            .copied();
        let mut tax_cents = sales;
        if let Some(surcharge_rate) = surcharge_rate {
            let alcohol_subtotal: Cents = items
                .iter()
                .filter(|i| i.is_alcohol)
                .map(|i| i.line_subtotal_cents())
                .sum();
            let surcharge = percent_of(alcohol_subtotal, surcharge_rate);
            if surcharge > 0 {
                tax_cents += surcharge;
                breakdown.push(TaxLine {
                    name: "Alcohol surcharge".to_string(),
                    rate: surcharge_rate,
                    amount_cents: surcharge,
                });
            }
        }

        TaxQuote {
            tax_cents,
            rate,
            breakdown,
        }
    }
}

fn upper_keys(rates: HashMap<String, f64>) -> HashMap<String, f64> {
    rates
        .into_iter()
        .map(|(k, v)| (k.trim().to_ascii_uppercase(), v))
        .collect()
}

#[async_trait]
impl TaxCalculator for StateTaxTable {
    async fn calculate(
        &self,
        items: &[CartItem],
        subtotal_cents: Cents,
        address: &ShippingAddress,
    ) -> Result<TaxQuote, BoxError> {
        Ok(self.quote(items, subtotal_cents, address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::cart_item;

    fn address(state: &str) -> ShippingAddress {
        ShippingAddress {
            city: "Springfield".to_string(),
            state: state.to_string(),
            zip_code: "00000".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_state_rate_overrides_default() {
        let table = StateTaxTable::new(5.0)
            .with_state_rates(HashMap::from([("ca".to_string(), 9.0)]));

        let items = vec![cart_item(None, 50.0, 1)];
        assert_eq!(table.quote(&items, 5000, &address("CA")).tax_cents, 450);
        assert_eq!(table.quote(&items, 5000, &address("NV")).tax_cents, 250);
    }

    #[test]
    fn test_alcohol_surcharge_only_applies_to_alcohol() {
        let table = StateTaxTable::new(0.0)
            .with_alcohol_surcharges(HashMap::from([("WA".to_string(), 10.0)]));

        let mut mixer = cart_item(None, 10.0, 1);
        mixer.is_alcohol = false;
        let wine = cart_item(None, 30.0, 1);

        let quote = table.quote(&[mixer, wine], 4000, &address("wa"));
        assert_eq!(quote.tax_cents, 300);
        assert_eq!(quote.breakdown.len(), 2);
        assert_eq!(quote.breakdown[1].amount_cents, 300);
    }
}
