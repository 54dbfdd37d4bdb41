use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use barcart_shared::Masked;

use crate::money::{dollars_to_cents, try_dollars_to_cents, Cents};
use crate::{CoreError, CoreResult};

/// A line of the customer's cart as submitted by the storefront.
///
/// Prices, taxes and shipping are client estimates. `id` references the
/// inventory row the line is drawn from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    #[serde(default, deserialize_with = "lenient_uuid")]
    pub product_id: Option<Uuid>,
    pub product_name: String,
    #[serde(default, deserialize_with = "lenient_uuid")]
    pub store_id: Option<Uuid>,
    #[serde(default)]
    pub store_name: Option<String>,
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub taxes: f64,
    #[serde(default)]
    pub shipping_cost: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_alcohol: bool,
}

/// $1,000,000.00 per unit.
pub const MAX_UNIT_PRICE_CENTS: Cents = 100_000_000;
pub const MAX_QUANTITY: u32 = 10_000;
/// Upper bound for a line's price, tax or shipping in cents.
pub const MAX_LINE_CENTS: Cents = MAX_UNIT_PRICE_CENTS * MAX_QUANTITY as Cents;

impl CartItem {
    pub fn unit_price_cents(&self) -> Cents {
        dollars_to_cents(self.price)
    }

    /// `price * quantity` in cents. Exact for lines that passed [`CartItem::validate`].
    pub fn line_subtotal_cents(&self) -> Cents {
        self.unit_price_cents().saturating_mul(Cents::from(self.quantity))
    }

    pub fn client_tax_cents(&self) -> Cents {
        dollars_to_cents(self.taxes)
    }

    pub fn client_shipping_cents(&self) -> Cents {
        dollars_to_cents(self.shipping_cost)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.quantity == 0 || self.quantity > MAX_QUANTITY {
            return Err(CoreError::ValidationError(format!(
                "Quantity for {} must be between 1 and {}",
                self.product_name, MAX_QUANTITY
            )));
        }
        self.check_amount("price", self.price, MAX_UNIT_PRICE_CENTS)?;
        self.check_amount("taxes", self.taxes, MAX_LINE_CENTS)?;
        self.check_amount("shipping cost", self.shipping_cost, MAX_LINE_CENTS)?;
        Ok(())
    }

    fn check_amount(&self, field: &str, amount: f64, max_cents: Cents) -> CoreResult<()> {
        match try_dollars_to_cents(amount) {
            Some(cents) if (0..=max_cents).contains(&cents) => Ok(()),
            _ => Err(CoreError::ValidationError(format!(
                "Invalid {} for {}",
                field, self.product_name
            ))),
        }
    }
}

/// Validates every line and returns the client-side cart total (subtotal,
/// tax and shipping) in cents.
pub fn validate_cart(items: &[CartItem]) -> CoreResult<Cents> {
    items.iter().try_fold(0 as Cents, |total, item| {
        item.validate()?;
        total
            .checked_add(item.line_subtotal_cents())
            .and_then(|t| t.checked_add(item.client_tax_cents()))
            .and_then(|t| t.checked_add(item.client_shipping_cents()))
            .ok_or_else(|| CoreError::ValidationError("Cart total is out of range".to_string()))
    })
}

/// Storefront ids are not always well-formed; an unparseable store or product
/// reference is treated as absent rather than failing the whole request.
pub fn lenient_uuid<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| Uuid::parse_str(s.trim()).ok()))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<Masked<String>>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "US".to_string()
}

impl ShippingAddress {
    /// Two-letter state code, upper-cased, used for tax and fee lookups.
    pub fn state_code(&self) -> Option<String> {
        let state = self.state.trim();
        if state.is_empty() {
            None
        } else {
            Some(state.to_ascii_uppercase())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_item_from_storefront_json() {
        let item: CartItem = serde_json::from_value(serde_json::json!({
            "id": "0b7a3a52-5b8e-4d4c-9d7e-3c1f7b0c2a11",
            "productId": "not-a-uuid",
            "productName": "Rye Whiskey",
            "storeId": "6f1d2a40-1111-4c7a-8f00-0d2b9c5e7a10",
            "storeName": "Corner Liquors",
            "price": 20.0,
            "quantity": 2,
            "taxes": 1.8,
            "shippingCost": 4.99,
            "category": "spirits",
            "isAlcohol": true
        }))
        .unwrap();

        assert!(item.product_id.is_none());
        assert!(item.store_id.is_some());
        assert_eq!(item.line_subtotal_cents(), 4000);
        assert_eq!(item.client_tax_cents(), 180);
        assert_eq!(item.client_shipping_cents(), 499);
    }

    fn lager(price: f64, quantity: u32) -> CartItem {
        CartItem {
            id: Uuid::new_v4(),
            product_id: None,
            product_name: "Lager".to_string(),
            store_id: None,
            store_name: None,
            price,
            quantity,
            taxes: 0.0,
            shipping_cost: 0.0,
            category: None,
            is_alcohol: true,
        }
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        assert!(lager(9.99, 0).validate().is_err());
    }

    #[test]
    fn test_amounts_outside_bounds_are_rejected() {
        assert!(lager(1.0e15, 10_000).validate().is_err());
        assert!(lager(1_000_000.01, 1).validate().is_err());
        assert!(lager(9.99, MAX_QUANTITY + 1).validate().is_err());
        assert!(lager(-0.01, 1).validate().is_err());
        assert!(lager(f64::NAN, 1).validate().is_err());

        let mut taxed = lager(9.99, 1);
        taxed.taxes = f64::INFINITY;
        assert!(taxed.validate().is_err());

        let largest = lager(1_000_000.0, MAX_QUANTITY);
        assert!(largest.validate().is_ok());
        assert_eq!(largest.line_subtotal_cents(), MAX_LINE_CENTS);
    }

    #[test]
    fn test_validate_cart_sums_client_totals() {
        let mut first = lager(20.0, 2);
        first.taxes = 1.8;
        first.shipping_cost = 4.99;
        let second = lager(10.0, 1);
        assert_eq!(validate_cart(&[first, second]).unwrap(), 4000 + 180 + 499 + 1000);

        let err = validate_cart(&[lager(9.99, 1), lager(1.0e15, 10_000)]).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_state_code_normalization() {
        let address = ShippingAddress {
            state: " ca ".to_string(),
            ..Default::default()
        };
        assert_eq!(address.state_code().as_deref(), Some("CA"));
        assert_eq!(ShippingAddress::default().state_code(), None);
    }
}
