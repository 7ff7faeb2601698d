use std::fmt::{self, Display};
use std::ops::{Add, Mul};

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

/// Monetary amount in minor units (cents).
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash,
)]
pub struct Money {
    cents: u64,
    currency: Currency,
}

impl Money {
    pub const fn new(cents: u64, currency: Currency) -> Self {
        Self { cents, currency }
    }

    pub const fn cents(&self) -> u64 {
        self.cents
    }

    pub const fn currency(&self) -> Currency {
        self.currency
    }

    pub const fn is_zero(&self) -> bool {
        self.cents == 0
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = (self.cents / 100).to_formatted_string(&Locale::en);
        write!(f, "{}{}.{:02}", self.currency.symbol(), whole, self.cents % 100)
    }
}

impl Mul<u32> for Money {
    type Output = Money;

    fn mul(self, rhs: u32) -> Self::Output {
        Money::new(self.cents * rhs as u64, self.currency)
    }
}

impl Add for Money {
    type Output = Money;

    /// Panics are avoided by construction: all amounts in one deployment
    /// share the configured currency.
    fn add(self, rhs: Money) -> Self::Output {
        debug_assert_eq!(self.currency, rhs.currency);
        Money::new(self.cents + rhs.cents, self.currency)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash)]
pub enum Currency {
    #[default]
    Eur,
}

impl Currency {
    pub const fn symbol(&self) -> &'static str {
        match self {
            Currency::Eur => "€",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        let price = Money::new(200_000, Currency::Eur);
        assert_eq!(format!("{}", price), "€2,000.00");
        let cheap = Money::new(950, Currency::Eur);
        assert_eq!(format!("{}", cheap), "€9.50");
    }

    #[test]
    fn test_money_times_nights() {
        let rate = Money::new(10_000, Currency::Eur);
        assert_eq!(rate * 2, Money::new(20_000, Currency::Eur));
        assert_eq!((rate * 0).cents(), 0);
    }
}
