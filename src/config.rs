use anyhow::{anyhow, Context};
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::macros::format_description;
use time::Date;

pub const CONFIG_PATH_VAR: &str = "PRICING_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "pricing.yml";
pub const API_KEY_VAR: &str = "WB_API_KEY";

/// Which commission column of the marketplace report applies to our sales.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    #[default]
    Marketplace,
    Supplier,
    SupplierExpress,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_common_api")]
    pub common_api: String,
    #[serde(default = "default_content_api")]
    pub content_api: String,
    #[serde(default = "default_prices_api")]
    pub prices_api: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            common_api: default_common_api(),
            content_api: default_content_api(),
            prices_api: default_prices_api(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Catalog subject ids whose cards are priced.
    pub category_ids: Vec<u64>,
    pub desired_margin: Decimal,
    pub tax_rate: Decimal,
    pub delivery_fee: Decimal,
    pub warehouse_fee: Decimal,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_vendor_code_pattern")]
    pub vendor_code_pattern: String,
    #[serde(default = "default_true")]
    pub use_pack_count: bool,
    #[serde(default = "default_commission_category_id")]
    pub commission_category_id: u64,
    #[serde(default)]
    pub commission_kind: CommissionKind,
    #[serde(default = "default_commission_buffer_percent")]
    pub commission_buffer_percent: Decimal,
    #[serde(default = "default_warehouse_name")]
    pub warehouse_name: String,
    /// `YYYY-MM-DD`, today in UTC when unset.
    #[serde(default)]
    pub tariff_date: Option<String>,
    #[serde(default)]
    pub min_tariff: Option<Decimal>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_price_page_size")]
    pub price_page_size: u32,
    #[serde(default = "default_with_photo")]
    pub with_photo: i32,
    #[serde(default = "default_supplier_base_url")]
    pub supplier_base_url: String,
    #[serde(default = "default_parallel_scrapes")]
    pub parallel_scrapes: usize,
    #[serde(default)]
    pub display_seed: Option<u64>,
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_common_api() -> String {
    "https://common-api.wildberries.ru".to_string()
}

fn default_content_api() -> String {
    "https://content-api.wildberries.ru".to_string()
}

fn default_prices_api() -> String {
    "https://discounts-prices-api.wildberries.ru".to_string()
}

fn default_db_path() -> String {
    "products.db".to_string()
}

fn default_vendor_code_pattern() -> String {
    r"^box_\d+_\d+$".to_string()
}

fn default_true() -> bool {
    true
}

fn default_commission_category_id() -> u64 {
    3979
}

fn default_commission_buffer_percent() -> Decimal {
    dec!(1)
}

fn default_warehouse_name() -> String {
    "Маркетплейс".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_price_page_size() -> u32 {
    1000
}

fn default_with_photo() -> i32 {
    1
}

fn default_supplier_base_url() -> String {
    "https://sp.cargo-avto.ru/catalog/".to_string()
}

fn default_parallel_scrapes() -> usize {
    1
}

impl Config {
    /// Reads the YAML file named by `PRICING_CONFIG` (or `pricing.yml`).
    pub fn load() -> Result<Self, anyhow::Error> {
        let path = envmnt::get_or(CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH);
        Self::from_file(&path)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read config {}", path.display()))?;
        Self::from_yaml(&input).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml(input: &str) -> Result<Self, anyhow::Error> {
        let config: Config = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.category_ids.is_empty() {
            return Err(anyhow!("category_ids must not be empty"));
        }
        for (name, value) in [
            ("desired_margin", self.desired_margin),
            ("tax_rate", self.tax_rate),
        ] {
            if value < Decimal::ZERO || value >= Decimal::ONE {
                return Err(anyhow!("{name} must be in [0, 1), got {value}"));
            }
        }
        for (name, value) in [
            ("delivery_fee", self.delivery_fee),
            ("warehouse_fee", self.warehouse_fee),
            ("commission_buffer_percent", self.commission_buffer_percent),
        ] {
            if value < Decimal::ZERO {
                return Err(anyhow!("{name} must not be negative, got {value}"));
            }
        }
        self.vendor_code_regex()?;
        self.tariff_date()?;
        if self.page_size == 0 || self.price_page_size == 0 {
            return Err(anyhow!("page sizes must be positive"));
        }
        if self.parallel_scrapes == 0 {
            return Err(anyhow!("parallel_scrapes must be positive"));
        }
        if self.warehouse_name.trim().is_empty() {
            return Err(anyhow!("warehouse_name must not be empty"));
        }
        Ok(())
    }

    pub fn vendor_code_regex(&self) -> Result<Regex, anyhow::Error> {
        Regex::new(&self.vendor_code_pattern)
            .with_context(|| format!("Invalid vendor_code_pattern {:?}", self.vendor_code_pattern))
    }

    pub fn tariff_date(&self) -> Result<Date, anyhow::Error> {
        match &self.tariff_date {
            Some(date) => Date::parse(date, format_description!("[year]-[month]-[day]"))
                .with_context(|| format!("Invalid tariff_date {date:?}")),
            None => Ok(time::OffsetDateTime::now_utc().date()),
        }
    }

    pub fn api_key() -> Result<String, anyhow::Error> {
        let key = envmnt::get_or(API_KEY_VAR, "");
        match key.trim() {
            "" => Err(anyhow!("{API_KEY_VAR} not set")),
            key => Ok(key.to_string()),
        }
    }
}
