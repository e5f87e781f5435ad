use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};

pub mod card;
pub mod quote;
pub mod record;

pub use card::{Dimensions, ProductCard, SizeVariant};
pub use quote::{CommissionRate, PriceQuote, ScrapedCost, TariffQuote};
pub use record::{PricedRecord, RecordKey};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[repr(u8)]
pub enum Availability {
    #[display("not available")]
    NotAvailable = 0,
    #[display("available")]
    Available = 1,
}

impl From<u32> for Availability {
    fn from(stock_locations: u32) -> Self {
        match stock_locations {
            0 => Self::NotAvailable,
            _ => Self::Available,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Display, Deref)]
pub struct Url(pub String);

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn availability_follows_stock_locations() {
        assert_eq!(Availability::NotAvailable, Availability::from(0));
        assert_eq!(Availability::Available, Availability::from(1));
        assert_eq!(Availability::Available, Availability::from(12));
    }
}
