use super::{de_decimal, MarketplaceApi};
use anyhow::Context;
use pricing_types::PriceQuote;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PriceListRequest {
    pub limit: u32,
    pub offset: u32,
    #[serde(rename = "filterNmID", skip_serializing_if = "Option::is_none")]
    pub filter_nm_id: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SizePrice {
    #[serde(default, deserialize_with = "de_decimal")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    pub discounted_price: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    pub club_discounted_price: Decimal,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GoodsPrice {
    #[serde(rename = "nmID")]
    pub nm_id: u64,
    pub vendor_code: String,
    #[serde(default)]
    pub sizes: Vec<SizePrice>,
}

impl GoodsPrice {
    /// Prices of the first size; zeroes when the goods carry no sizes.
    pub fn quote(&self) -> PriceQuote {
        self.sizes
            .first()
            .map(|s| PriceQuote {
                list: s.price,
                discounted: s.discounted_price,
                loyalty: s.club_discounted_price,
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug)]
pub(super) struct PricesResponse {
    pub data: PricesData,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(super) struct PricesData {
    #[serde(default)]
    pub list_goods: Vec<GoodsPrice>,
}

/// Current marketplace prices keyed by vendor code.
#[derive(Debug, Clone, Default)]
pub struct PriceBook(HashMap<String, PriceQuote>);

impl PriceBook {
    /// The first quote seen for a vendor code wins.
    pub fn from_goods<I: IntoIterator<Item = GoodsPrice>>(goods: I) -> Self {
        let mut quotes = HashMap::new();
        for g in goods {
            let quote = g.quote();
            quotes.entry(g.vendor_code).or_insert(quote);
        }
        Self(quotes)
    }

    pub fn get(&self, vendor_code: &str) -> Option<PriceQuote> {
        self.0.get(vendor_code).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reads the price list page by page until a short page or a page that adds
/// no vendor codes not seen before.
pub async fn fetch_all(api: &dyn MarketplaceApi, page_size: u32) -> Result<PriceBook, anyhow::Error> {
    let mut goods = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = 0;
    loop {
        let request = PriceListRequest {
            limit: page_size,
            offset,
            filter_nm_id: None,
        };
        let page = api
            .prices_page(&request)
            .await
            .with_context(|| format!("Unable to fetch prices at offset {offset}"))?;
        let fetched = page.len();
        let mut fresh = 0;
        for g in &page {
            if seen.insert(g.vendor_code.clone()) {
                fresh += 1;
            }
        }
        goods.extend(page);
        if fetched < page_size as usize {
            break;
        }
        if fresh == 0 {
            log::warn!("Price page at offset {offset} repeats known vendor codes, stopping");
            break;
        }
        offset += page_size;
    }
    let book = PriceBook::from_goods(goods);
    log::info!("Loaded prices for {} vendor codes", book.len());
    Ok(book)
}
