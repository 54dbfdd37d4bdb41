//! Integer minor-unit money helpers. All checkout arithmetic happens in cents;
//! floating point only appears at the JSON boundary.

/// Amount in minor currency units.
pub type Cents = i64;

/// Largest magnitude an `f64` carries with whole-cent precision (2^53).
const MAX_EXACT_CENTS: f64 = 9_007_199_254_740_992.0;

/// Callers pass amounts that already went through [`try_dollars_to_cents`].
pub fn dollars_to_cents(amount: f64) -> Cents {
    (amount * 100.0).round() as Cents
}

/// `None` for NaN, infinities and amounts too large to hold exactly in cents.
pub fn try_dollars_to_cents(amount: f64) -> Option<Cents> {
    let cents = (amount * 100.0).round();
    if cents.is_finite() && cents.abs() <= MAX_EXACT_CENTS {
        Some(cents as Cents)
    } else {
        None
    }
}

pub fn cents_to_dollars(cents: Cents) -> f64 {
    cents as f64 / 100.0
}

/// `percent` of `amount`, rounded half away from zero to the nearest cent.
pub fn percent_of(amount: Cents, percent: f64) -> Cents {
    (amount as f64 * percent / 100.0).round() as Cents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollar_conversion_rounds_to_nearest_cent() {
        assert_eq!(dollars_to_cents(4.99), 499);
        assert_eq!(dollars_to_cents(19.999), 2000);
        assert_eq!(dollars_to_cents(0.1 + 0.2), 30);
        assert_eq!(cents_to_dollars(1234), 12.34);
    }

    #[test]
    fn test_unrepresentable_amounts_have_no_cents() {
        assert_eq!(try_dollars_to_cents(4.99), Some(499));
        assert_eq!(try_dollars_to_cents(f64::NAN), None);
        assert_eq!(try_dollars_to_cents(f64::INFINITY), None);
        assert_eq!(try_dollars_to_cents(1.0e300), None);
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(10_000, 10.0), 1_000);
        assert_eq!(percent_of(999, 2.9), 29);
        assert_eq!(percent_of(0, 15.0), 0);
    }
}
