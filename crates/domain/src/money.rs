//! Currency-safe monetary amounts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by money arithmetic and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    #[error("Subtracting {subtrahend} from {minuend} would go negative")]
    NegativeResult { minuend: Money, subtrahend: Money },

    #[error("Amount overflow")]
    Overflow,

    #[error("Invalid currency code: {0:?} (expected 3 letters)")]
    InvalidCurrency(String),
}

/// ISO-4217 style three letter currency code, always upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");

    /// Parses a code, accepting lower case input.
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let bytes = code.trim().as_bytes();
        match bytes {
            [a, b, c] if bytes.iter().all(u8::is_ascii_alphabetic) => Ok(Self([
                a.to_ascii_uppercase(),
                b.to_ascii_uppercase(),
                c.to_ascii_uppercase(),
            ])),
            _ => Err(MoneyError::InvalidCurrency(code.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        // Constructed from ASCII letters only.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::USD
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.as_str().to_string()
    }
}

/// A non-negative amount in a specific currency.
///
/// The amount is held in minor units (cents) so arithmetic is exact.
/// Persisted as `{"amount": <minor units>, "currency": "USD"}`; the currency is
/// never dropped, so a reloaded value is as currency-safe as the original.
/// Every operation returns a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: u64,
    currency: Currency,
}

impl Money {
    pub fn new(amount: u64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Shorthand for a USD amount in cents.
    pub fn usd(cents: u64) -> Self {
        Self::new(cents, Currency::USD)
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Amount in minor units.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(&other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Subtracts `other`, refusing to produce a negative amount.
    pub fn checked_sub(&self, other: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(&other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::NegativeResult {
                minuend: *self,
                subtrahend: other,
            })?;
        Ok(Money::new(amount, self.currency))
    }

    pub fn checked_mul(&self, quantity: u32) -> Result<Money, MoneyError> {
        let amount = self
            .amount
            .checked_mul(u64::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Sums amounts that must all be in `currency`.
    pub fn sum<I>(currency: Currency, amounts: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero(Currency::default())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.amount / 100,
            self.amount % 100,
            self.currency
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_is_normalized_to_upper_case() {
        assert_eq!(Currency::new("usd").unwrap(), Currency::USD);
        assert_eq!(Currency::new(" eur ").unwrap().as_str(), "EUR");
    }

    #[test]
    fn currency_rejects_bad_codes() {
        for code in ["", "US", "USDX", "U$D", "123"] {
            assert!(
                matches!(Currency::new(code), Err(MoneyError::InvalidCurrency(_))),
                "{code} should be rejected"
            );
        }
    }

    #[test]
    fn display_uses_two_decimals() {
        assert_eq!(Money::usd(10000).to_string(), "100.00 USD");
        assert_eq!(Money::usd(9999).to_string(), "99.99 USD");
        assert_eq!(Money::usd(5).to_string(), "0.05 USD");
    }

    #[test]
    fn arithmetic_between_equal_currencies() {
        let a = Money::usd(1000);
        let b = Money::usd(250);
        assert_eq!(a.checked_add(b).unwrap(), Money::usd(1250));
        assert_eq!(a.checked_sub(b).unwrap(), Money::usd(750));
        assert_eq!(b.checked_mul(4).unwrap(), Money::usd(1000));
    }

    #[test]
    fn mixed_currency_arithmetic_is_rejected() {
        let usd = Money::usd(100);
        let eur = Money::new(100, Currency::EUR);
        assert!(matches!(
            usd.checked_add(eur),
            Err(MoneyError::CurrencyMismatch { .. })
        ));
        assert!(matches!(
            usd.checked_sub(eur),
            Err(MoneyError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn subtraction_cannot_go_negative() {
        let err = Money::usd(100).checked_sub(Money::usd(101)).unwrap_err();
        assert!(matches!(err, MoneyError::NegativeResult { .. }));
        assert_eq!(
            Money::usd(100).checked_sub(Money::usd(100)).unwrap(),
            Money::zero(Currency::USD)
        );
    }

    #[test]
    fn overflow_is_reported() {
        let huge = Money::usd(u64::MAX);
        assert_eq!(huge.checked_add(Money::usd(1)), Err(MoneyError::Overflow));
        assert_eq!(huge.checked_mul(2), Err(MoneyError::Overflow));
    }

    #[test]
    fn sum_of_amounts() {
        let total = Money::sum(Currency::USD, [Money::usd(100), Money::usd(250)]).unwrap();
        assert_eq!(total, Money::usd(350));
        assert_eq!(
            Money::sum(Currency::USD, []).unwrap(),
            Money::zero(Currency::USD)
        );
    }

    #[test]
    fn persisted_as_amount_currency_pair() {
        let json = serde_json::to_value(Money::usd(9999)).unwrap();
        assert_eq!(json, serde_json::json!({ "amount": 9999, "currency": "USD" }));

        let bad = serde_json::json!({ "amount": 1, "currency": "DOLLARS" });
        assert!(serde_json::from_value::<Money>(bad).is_err());
    }
}
