use crate::card::Dimensions;
use crate::quote::PriceQuote;
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Natural key of a priced row: one supplier product sold in one pack size.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{product_id}x{pack_count}")]
pub struct RecordKey {
    pub product_id: String,
    pub pack_count: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PricedRecord {
    pub key: RecordKey,
    pub nm_id: u64,
    pub vendor_code: String,
    pub title: String,
    pub sku: String,
    pub dimensions: Dimensions,
    pub marketplace_price: Option<PriceQuote>,
    pub stock_locations: u32,
    pub cost: i64,
    pub tariff: Decimal,
    pub commission: i64,
    pub solved_price: Decimal,
    pub display_price: i64,
    pub display_discount: i64,
}

impl PricedRecord {
    pub fn key(&self) -> &RecordKey {
        &self.key
    }
}
