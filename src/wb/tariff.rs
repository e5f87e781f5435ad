use super::{MarketplaceApi, WarehouseTariff};
use anyhow::{anyhow, Context};
use pricing_types::TariffQuote;
use time::Date;

/// Looks up the box delivery coefficients of `warehouse` for `date`.
pub async fn resolve(
    api: &dyn MarketplaceApi,
    date: Date,
    warehouse: &str,
) -> Result<TariffQuote, anyhow::Error> {
    let list = api
        .box_tariffs(date)
        .await
        .context("Unable to fetch box tariffs")?;
    select(&list, warehouse, date)
}

fn select(list: &[WarehouseTariff], warehouse: &str, date: Date) -> Result<TariffQuote, anyhow::Error> {
    let entry = list
        .iter()
        .find(|w| w.warehouse_name == warehouse)
        .ok_or_else(|| anyhow!("Warehouse {warehouse:?} not found in box tariffs"))?;
    match (entry.box_delivery_base, entry.box_delivery_liter) {
        (Some(base), Some(per_liter)) => Ok(TariffQuote {
            warehouse: entry.warehouse_name.clone(),
            valid_for: date.to_string(),
            base,
            per_liter,
        }),
        _ => Err(anyhow!(
            "Warehouse {warehouse:?} has non-numeric tariff coefficients"
        )),
    }
}
