use async_trait::async_trait;
use barcart_core::money::percent_of;
use barcart_core::pricing::{FeeBreakdown, FeeCalculator, FeeQuote, FeeSource};
use barcart_core::{BoxError, Cents};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeeRule {
    pub percent: f64,
    #[serde(default)]
    pub fixed_cents: Cents,
}

/// Marketplace commission: a global rule, replaced entirely by a state rule
/// when the buyer's state has one.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    global: FeeRule,
    state_overrides: HashMap<String, FeeRule>,
}

impl FeeSchedule {
    pub fn new(global: FeeRule) -> Self {
        Self {
            global,
            state_overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, state: &str, rule: FeeRule) -> Self {
        self.state_overrides
            .insert(state.trim().to_ascii_uppercase(), rule);
        self
    }

    pub fn quote(&self, amount_cents: Cents, state: Option<&str>) -> FeeQuote {
        let state = state.map(|s| s.trim().to_ascii_uppercase());
        let (rule, source) = match state.as_ref().and_then(|s| self.state_overrides.get(s)) {
            Some(rule) => (*rule, FeeSource::State),
            None => (self.global, FeeSource::Global),
        };

        let percent_cents = percent_of(amount_cents, rule.percent);
        let commission_cents = (percent_cents + rule.fixed_cents).clamp(0, amount_cents.max(0));

        FeeQuote {
            commission_cents,
            breakdown: FeeBreakdown {
                source,
                state,
                percent: rule.percent,
                percent_cents,
                fixed_cents: rule.fixed_cents,
            },
        }
    }
}

#[async_trait]
impl FeeCalculator for FeeSchedule {
    async fn platform_fee(
        &self,
        amount_cents: Cents,
        state: Option<&str>,
    ) -> Result<FeeQuote, BoxError> {
        Ok(self.quote(amount_cents, state))
    }
}
