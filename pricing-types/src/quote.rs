use crate::Availability;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Box delivery coefficients of one warehouse, valid for the requested date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TariffQuote {
    pub warehouse: String,
    pub valid_for: String,
    pub base: Decimal,
    pub per_liter: Decimal,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionRate {
    pub category_id: u64,
    pub percent: Decimal,
}

impl CommissionRate {
    /// Commission as a fraction of the sale price, widened by `buffer_percent`
    /// percentage points.
    pub fn fraction(&self, buffer_percent: Decimal) -> Decimal {
        (self.percent + buffer_percent) / Decimal::ONE_HUNDRED
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceQuote {
    pub list: Decimal,
    pub discounted: Decimal,
    pub loyalty: Decimal,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapedCost {
    pub base_price: Decimal,
    pub stock_locations: u32,
}

impl ScrapedCost {
    pub fn availability(&self) -> Availability {
        self.stock_locations.into()
    }
}
