use crate::config::{CommissionKind, HttpConfig};
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::macros::format_description;
use time::Date;

pub mod cards;
pub mod commission;
pub mod prices;
pub mod tariff;

pub use cards::{CardsListRequest, CardsPage};
pub use prices::{GoodsPrice, PriceBook, PriceListRequest};

/// Warehouse row of the box tariff report. Coefficients may be absent or
/// written with a decimal comma.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseTariff {
    pub warehouse_name: String,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub box_delivery_base: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub box_delivery_liter: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct TariffResponse {
    response: TariffResponseBody,
}

#[derive(Debug, Deserialize)]
struct TariffResponseBody {
    data: TariffData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TariffData {
    #[serde(default)]
    warehouse_list: Vec<WarehouseTariff>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommissionEntry {
    #[serde(rename = "subjectID")]
    pub subject_id: u64,
    #[serde(default)]
    pub subject_name: String,
    #[serde(default, deserialize_with = "de_decimal")]
    pub kgvp_marketplace: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    pub kgvp_supplier: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    pub kgvp_supplier_express: Decimal,
}

impl CommissionEntry {
    pub fn percent(&self, kind: CommissionKind) -> Decimal {
        match kind {
            CommissionKind::Marketplace => self.kgvp_marketplace,
            CommissionKind::Supplier => self.kgvp_supplier,
            CommissionKind::SupplierExpress => self.kgvp_supplier_express,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommissionResponse {
    #[serde(default)]
    report: Vec<CommissionEntry>,
}

/// Marketplace seller API as consumed by the pricing run.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    async fn box_tariffs(&self, date: Date) -> Result<Vec<WarehouseTariff>, anyhow::Error>;
    async fn commissions(&self) -> Result<Vec<CommissionEntry>, anyhow::Error>;
    async fn cards_page(&self, request: &CardsListRequest) -> Result<CardsPage, anyhow::Error>;
    async fn prices_page(&self, request: &PriceListRequest)
        -> Result<Vec<GoodsPrice>, anyhow::Error>;
}

pub struct WbClient {
    client: ClientWithMiddleware,
    api_key: String,
    http: HttpConfig,
}

impl WbClient {
    pub fn new(client: ClientWithMiddleware, api_key: &str, http: HttpConfig) -> Self {
        Self {
            client,
            api_key: normalize_token(api_key),
            http,
        }
    }

    async fn get_json<T, Q>(&self, url: &str, query: &Q) -> Result<T, anyhow::Error>
    where
        T: for<'de> Deserialize<'de>,
        Q: Serialize + ?Sized,
    {
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.api_key)
            .query(query)
            .send()
            .await?;
        decode(url, resp).await
    }

    async fn post_json<T, B>(&self, url: &str, body: &B) -> Result<T, anyhow::Error>
    where
        T: for<'de> Deserialize<'de>,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(body)?;
        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, &self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        decode(url, resp).await
    }
}

#[async_trait]
impl MarketplaceApi for WbClient {
    async fn box_tariffs(&self, date: Date) -> Result<Vec<WarehouseTariff>, anyhow::Error> {
        let url = format!("{}/api/v1/tariffs/box", self.http.common_api);
        let date = date.format(format_description!("[year]-[month]-[day]"))?;
        let res: TariffResponse = self.get_json(&url, &[("date", date)]).await?;
        Ok(res.response.data.warehouse_list)
    }

    async fn commissions(&self) -> Result<Vec<CommissionEntry>, anyhow::Error> {
        let url = format!("{}/api/v1/tariffs/commission", self.http.common_api);
        let res: CommissionResponse = self.get_json(&url, &[("locale", "ru")]).await?;
        Ok(res.report)
    }

    async fn cards_page(&self, request: &CardsListRequest) -> Result<CardsPage, anyhow::Error> {
        let url = format!("{}/content/v2/get/cards/list", self.http.content_api);
        self.post_json(&url, request).await
    }

    async fn prices_page(
        &self,
        request: &PriceListRequest,
    ) -> Result<Vec<GoodsPrice>, anyhow::Error> {
        let url = format!("{}/api/v2/list/goods/filter", self.http.prices_api);
        let res: prices::PricesResponse = self.get_json(&url, request).await?;
        Ok(res.data.list_goods)
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(
    url: &str,
    resp: reqwest::Response,
) -> Result<T, anyhow::Error> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(anyhow!("{url} {status}: {}", truncate_body(&text)));
    }
    if text.trim().is_empty() {
        return Err(anyhow!("{url}: empty response"));
    }
    serde_json::from_str::<T>(&text)
        .map_err(|err| anyhow!("{url}: decode error: {err}. Body: {}", truncate_body(&text)))
}

fn normalize_token(token: &str) -> String {
    let trimmed = token.trim();
    let lower = trimmed.to_lowercase();
    if let Some(rest) = lower.strip_prefix("bearer ") {
        let offset = trimmed.len().saturating_sub(rest.len());
        trimmed[offset..].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 220;
    let trimmed = body.trim();
    if trimmed.len() <= LIMIT {
        return trimmed.to_string();
    }
    let end = trimmed
        .char_indices()
        .map(|(idx, _)| idx)
        .take_while(|idx| *idx <= LIMIT)
        .last()
        .unwrap_or(0);
    format!("{}...", &trimmed[..end])
}

/// Parses `"46,5"`, `"1 000"` and plain numbers; anything else is `None`.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim().replace(',', ".").replace([' ', '\u{a0}'], "");
    Decimal::from_str(&s).ok()
}

fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Int(i64),
        Num(f64),
        Str(String),
    }
    let v = Option::<NumOrStr>::deserialize(deserializer)?;
    Ok(v.and_then(|val| match val {
        NumOrStr::Int(i) => Some(Decimal::from(i)),
        NumOrStr::Num(n) => Decimal::from_str(&n.to_string()).ok(),
        NumOrStr::Str(s) => parse_decimal(&s),
    }))
}

fn de_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(de_opt_decimal(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
pub mod test {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_token_strips_bearer_prefix() {
        assert_eq!(normalize_token("Bearer abc123"), "abc123");
        assert_eq!(normalize_token("  bearer abc123  "), "abc123");
        assert_eq!(normalize_token("abc123"), "abc123");
    }

    #[test]
    fn parses_decimal_comma() {
        assert_eq!(Some(dec!(46.5)), parse_decimal("46,5"));
        assert_eq!(Some(dec!(1000)), parse_decimal("1 000"));
        assert_eq!(None, parse_decimal("-"));
    }

    #[test]
    fn deserializes_tariff_report() {
        let raw = r#"{"response": {"data": {"warehouseList": [
            {"warehouseName": "Коледино", "boxDeliveryBase": "48", "boxDeliveryLiter": "11,2"},
            {"warehouseName": "Маркетплейс", "boxDeliveryBase": 50, "boxDeliveryLiter": 10.5},
            {"warehouseName": "Казань", "boxDeliveryBase": "-"}
        ]}}}"#;
        let res: TariffResponse = serde_json::from_str(raw).expect("valid report");
        let list = res.response.data.warehouse_list;
        assert_eq!(3, list.len());
        assert_eq!(Some(dec!(11.2)), list[0].box_delivery_liter);
        assert_eq!(Some(dec!(50)), list[1].box_delivery_base);
        assert_eq!(Some(dec!(10.5)), list[1].box_delivery_liter);
        assert_eq!(None, list[2].box_delivery_base);
        assert_eq!(None, list[2].box_delivery_liter);
    }

    #[test]
    fn selects_commission_column() {
        let raw = r#"{"report": [{"subjectID": 3979, "subjectName": "Коробки",
            "kgvpMarketplace": 7.5, "kgvpSupplier": 12, "kgvpSupplierExpress": "3"}]}"#;
        let res: CommissionResponse = serde_json::from_str(raw).expect("valid report");
        let entry = &res.report[0];
        assert_eq!(dec!(7.5), entry.percent(CommissionKind::Marketplace));
        assert_eq!(dec!(12), entry.percent(CommissionKind::Supplier));
        assert_eq!(dec!(3), entry.percent(CommissionKind::SupplierExpress));
    }

    #[test]
    fn truncates_long_body() {
        let body = "x".repeat(500);
        let truncated = truncate_body(&body);
        assert!(truncated.len() < 230);
        assert!(truncated.ends_with("..."));
        assert_eq!("short", truncate_body(" short "));
    }
}
