use async_trait::async_trait;
use derive_more::{Constructor, Display, Error};
use pricing_types::{Availability, ScrapedCost, Url};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use scraper::Html;
use std::str::FromStr;

pub mod selectors {
    #![allow(clippy::unwrap_used)]
    use once_cell::sync::Lazy;
    use regex::Regex;
    use scraper::Selector;

    /// Price of the smallest purchase tier.
    pub static PRICE: Lazy<Selector> =
        Lazy::new(|| Selector::parse(r#"li[data-min="1"] .price-val"#).unwrap());
    /// Pickup locations reporting the product in stock.
    pub static AVAILABLE_LOCATION: Lazy<Selector> =
        Lazy::new(|| Selector::parse(".avail-item-status.avail").unwrap());
    /// First number in a price label; spaces may group thousands.
    pub static PRICE_NUMBER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\d[\d \x{a0}\x{202f}]*(?:[.,]\d+)?").unwrap());
}

#[derive(Debug, Display, Error)]
pub enum ScrapeError {
    #[display("network error: {_0}")]
    Network(reqwest::Error),
    #[display("{_0}")]
    Other(anyhow::Error),
    #[error(ignore)]
    #[display("price not found at {_0}")]
    MissingPrice(Url),
    #[error(ignore)]
    #[display("unable to parse price {_0:?}")]
    InvalidPrice(String),
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeError::Network(err)
    }
}

impl From<anyhow::Error> for ScrapeError {
    fn from(err: anyhow::Error) -> Self {
        ScrapeError::Other(err)
    }
}

impl From<reqwest_middleware::Error> for ScrapeError {
    fn from(err: reqwest_middleware::Error) -> ScrapeError {
        match err {
            reqwest_middleware::Error::Middleware(err) => ScrapeError::Other(err),
            reqwest_middleware::Error::Reqwest(err) => ScrapeError::Network(err),
        }
    }
}

/// What a supplier product page shows: the raw price text and how many
/// pickup locations have the product in stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    pub price_text: String,
    pub stock_locations: u32,
}

impl PageResult {
    pub fn price(&self) -> Result<Decimal, ScrapeError> {
        parse_price(&self.price_text)
    }

    pub fn availability(&self) -> Availability {
        self.stock_locations.into()
    }

    pub fn into_cost(self) -> Result<ScrapedCost, ScrapeError> {
        Ok(ScrapedCost {
            base_price: self.price()?,
            stock_locations: self.stock_locations,
        })
    }
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<PageResult, ScrapeError>;
}

pub fn product_url(base_url: &str, product_id: &str) -> Url {
    Url(format!("{}/{product_id}/", base_url.trim_end_matches('/')))
}

/// Takes the first number of the label and drops its thousands separators,
/// leaving a plain decimal with a dot separator. Empty when there is none.
pub fn normalize_price_text(text: &str) -> String {
    selectors::PRICE_NUMBER
        .find(text)
        .map(|m| {
            m.as_str()
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| if c == ',' { '.' } else { c })
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_price(text: &str) -> Result<Decimal, ScrapeError> {
    let normalized = normalize_price_text(text);
    Decimal::from_str(&normalized).map_err(|_| ScrapeError::InvalidPrice(text.to_string()))
}

pub fn parse_product_page(document: &Html, url: &Url) -> Result<PageResult, ScrapeError> {
    let price_text = document
        .select(&selectors::PRICE)
        .map(|e| e.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
        .ok_or_else(|| ScrapeError::MissingPrice(url.clone()))?;
    let stock_locations = document.select(&selectors::AVAILABLE_LOCATION).count() as u32;
    Ok(PageResult {
        price_text,
        stock_locations,
    })
}

/// Reads supplier pages over plain HTTP. One client is shared for the run.
#[derive(Constructor, Clone)]
pub struct HttpPageRenderer {
    client: ClientWithMiddleware,
}

#[async_trait]
impl PageRenderer for HttpPageRenderer {
    async fn fetch(&self, url: &Url) -> Result<PageResult, ScrapeError> {
        let body = self
            .client
            .get(url.as_str())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let document = Html::parse_document(&body);
        let page = parse_product_page(&document, url)?;
        log::debug!(
            "Parsed {url}: price {}, {} ({} locations)",
            page.price_text,
            page.availability(),
            page.stock_locations
        );
        Ok(page)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use rust_decimal_macros::dec;

    const PAGE: &str = r#"
        <html><body>
            <ul class="prices">
                <li data-min="10"><span class="price-val">90 р</span></li>
                <li data-min="1"><span class="price-val"> 1 234 р </span></li>
            </ul>
            <div id="samovivoz-tabs">
                <div class="avail-item"><span class="avail-item-status avail">есть</span></div>
                <div class="avail-item"><span class="avail-item-status">нет</span></div>
                <div class="avail-item"><span class="avail-item-status avail">есть</span></div>
            </div>
        </body></html>
    "#;

    #[test]
    fn normalizes_price_text() {
        assert_eq!("1234", normalize_price_text(" 1 234 р "));
        assert_eq!("1234.50", normalize_price_text("1\u{a0}234,50 ₽"));
        assert_eq!("99", normalize_price_text("99 руб."));
        assert_eq!("", normalize_price_text("по запросу"));
    }

    #[test]
    fn takes_first_number_of_tiered_label() {
        assert_eq!("1234", normalize_price_text("1 234 р (от 10 шт: 1 100 р)"));
        assert_eq!(
            dec!(1234),
            parse_price("1 234 р (от 10 шт: 1 100 р)").expect("valid price")
        );
        assert_eq!(dec!(5.5), parse_price("5,5 р. / 2,4 р.").expect("valid price"));
    }

    #[test]
    fn parses_price() {
        assert_eq!(dec!(1234), parse_price("1 234 р").expect("valid price"));
        assert_eq!(dec!(12.5), parse_price("12,5").expect("valid price"));
        assert!(matches!(
            parse_price("по запросу"),
            Err(ScrapeError::InvalidPrice(_))
        ));
    }

    #[test]
    fn parses_product_page() {
        let url = product_url("https://sp.cargo-avto.ru/catalog/", "4821");
        assert_eq!("https://sp.cargo-avto.ru/catalog/4821/", url.0);
        let page = parse_product_page(&Html::parse_document(PAGE), &url).expect("valid page");
        assert_eq!("1 234 р", page.price_text);
        assert_eq!(2, page.stock_locations);
        assert_eq!(Availability::Available, page.availability());
        let cost = page.into_cost().expect("numeric price");
        assert_eq!(dec!(1234), cost.base_price);
    }

    #[test]
    fn reports_missing_price() {
        let url = product_url("https://sp.cargo-avto.ru/catalog", "1");
        let res = parse_product_page(&Html::parse_document("<html></html>"), &url);
        assert!(matches!(res, Err(ScrapeError::MissingPrice(_))));
    }
}
