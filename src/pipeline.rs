use crate::cache::ScrapeCache;
use crate::config::Config;
use crate::pricing::{DisplayMarkup, PricingError, PricingModel};
use crate::record::RecordRepository;
use crate::vendor_code::{DecodeError, DecodedVendorCode, VendorCodeDecoder};
use crate::wb::cards::{self, WalkOptions};
use crate::wb::{commission, prices, tariff, MarketplaceApi, PriceBook};
use anyhow::anyhow;
use derive_more::{Display, Error};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use pricing_types::{PricedRecord, ProductCard, RecordKey, ScrapedCost};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use supplier_parser::{PageRenderer, ScrapeError};
use tokio_util::sync::CancellationToken;

const LOG_EVERY: usize = 50;

/// Why a card produced no row.
#[derive(Debug, Display, Error)]
pub enum SkipReason {
    #[display("{_0}")]
    Decode(DecodeError),
    #[error(ignore)]
    #[display("expected exactly one sku, found {_0}")]
    SkuCount(usize),
    #[display("scrape failed: {_0}")]
    Scrape(ScrapeError),
    #[display("pricing failed: {_0}")]
    Pricing(PricingError),
    #[display("unable to store row: {_0}")]
    Store(anyhow::Error),
}

impl From<DecodeError> for SkipReason {
    fn from(err: DecodeError) -> Self {
        SkipReason::Decode(err)
    }
}

impl From<ScrapeError> for SkipReason {
    fn from(err: ScrapeError) -> Self {
        SkipReason::Scrape(err)
    }
}

impl From<PricingError> for SkipReason {
    fn from(err: PricingError) -> Self {
        SkipReason::Pricing(err)
    }
}

#[derive(Debug)]
pub struct SkippedItem {
    pub vendor_code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub cards: usize,
    pub saved: usize,
    pub skipped: Vec<SkippedItem>,
    pub scrapes: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    fn skip(&mut self, vendor_code: String, reason: SkipReason) {
        log::warn!("Skipping {vendor_code}: {reason}");
        self.skipped.push(SkippedItem {
            vendor_code,
            reason,
        });
    }

    pub fn log(&self) {
        log::info!(
            "Processed {} cards in {}: {} saved, {} skipped, {} pages scraped{}",
            self.cards,
            crate::format_duration(&self.elapsed),
            self.saved,
            self.skipped.len(),
            self.scrapes,
            if self.cancelled { " (cancelled)" } else { "" }
        );
        for item in &self.skipped {
            log::info!("  {}: {}", item.vendor_code, item.reason);
        }
    }
}

/// A card that passed validation and waits for its supplier cost.
struct Candidate {
    card: ProductCard,
    sku: String,
    decoded: DecodedVendorCode,
}

fn prepare(decoder: &VendorCodeDecoder, card: ProductCard) -> Result<Candidate, (String, SkipReason)> {
    let decoded = match decoder.decode(&card.vendor_code) {
        Ok(d) => d,
        Err(err) => return Err((card.vendor_code, err.into())),
    };
    let sku = match card.single_sku() {
        Ok(sku) => sku.to_string(),
        Err(count) => return Err((card.vendor_code, SkipReason::SkuCount(count))),
    };
    Ok(Candidate { card, sku, decoded })
}

pub struct Pipeline {
    api: Arc<dyn MarketplaceApi>,
    renderer: Arc<dyn PageRenderer>,
    repo: Arc<dyn RecordRepository>,
    config: Config,
    token: CancellationToken,
    pb_style: Option<ProgressStyle>,
}

impl Pipeline {
    pub fn new(
        api: Arc<dyn MarketplaceApi>,
        renderer: Arc<dyn PageRenderer>,
        repo: Arc<dyn RecordRepository>,
        config: Config,
        token: CancellationToken,
        pb_style: Option<ProgressStyle>,
    ) -> Self {
        Self {
            api,
            renderer,
            repo,
            config,
            token,
            pb_style,
        }
    }

    async fn or_cancel<T, F>(&self, f: F) -> Result<T, anyhow::Error>
    where
        F: Future<Output = Result<T, anyhow::Error>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(anyhow!("Run cancelled")),
            res = f => res,
        }
    }

    pub async fn run(&self) -> Result<RunSummary, anyhow::Error> {
        let started = Instant::now();
        let config = &self.config;
        let api = self.api.as_ref();

        let tariff_date = config.tariff_date()?;
        let tariff = self
            .or_cancel(tariff::resolve(api, tariff_date, &config.warehouse_name))
            .await?;
        log::info!(
            "Box tariff for {} on {}: base {}, per liter {}",
            tariff.warehouse,
            tariff.valid_for,
            tariff.base,
            tariff.per_liter
        );
        let commission = self
            .or_cancel(commission::resolve(
                api,
                config.commission_category_id,
                config.commission_kind,
            ))
            .await?;
        let commission_rate = commission.fraction(config.commission_buffer_percent);
        log::info!(
            "Commission for category {}: {}% (rate {commission_rate})",
            commission.category_id,
            commission.percent
        );

        let walk = WalkOptions {
            category_ids: config.category_ids.clone(),
            page_size: config.page_size,
            with_photo: config.with_photo,
        };
        let cards = cards::walk(api, &walk, &self.token).await?;
        log::info!("Fetched {} cards", cards.len());
        let prices = self
            .or_cancel(prices::fetch_all(api, config.price_page_size))
            .await?;

        let model = PricingModel {
            desired_margin: config.desired_margin,
            tax_rate: config.tax_rate,
            commission_rate,
            delivery_fee: config.delivery_fee,
            warehouse_fee: config.warehouse_fee,
            tariff,
            min_tariff: config.min_tariff,
        };
        let mut markup = DisplayMarkup::new(config.display_seed);
        let decoder = VendorCodeDecoder::new(config.vendor_code_regex()?, config.use_pack_count);
        let cache = ScrapeCache::new(self.renderer.clone(), config.supplier_base_url.clone());

        let mut summary = RunSummary {
            cards: cards.len(),
            ..Default::default()
        };
        let mut candidates = Vec::with_capacity(cards.len());
        for card in cards {
            match prepare(&decoder, card) {
                Ok(c) => candidates.push(c),
                Err((vendor_code, reason)) => summary.skip(vendor_code, reason),
            }
        }

        let total = candidates.len();
        let pb = self.pb_style.clone().map(|s| {
            let p = ProgressBar::new(total as u64).with_style(s);
            p.enable_steady_tick(Duration::from_millis(500));
            p
        });
        let cache = &cache;
        let mut scraped = stream::iter(candidates.into_iter().map(|c| async move {
            let cost = cache.fetch(&c.decoded.product_id).await;
            (c, cost)
        }))
        .buffered(config.parallel_scrapes);

        let mut done = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    log::info!("Run cancelled after {done} of {total} cards");
                    summary.cancelled = true;
                    break;
                }
                next = scraped.next() => next,
            };
            let Some((candidate, cost)) = next else {
                break;
            };
            let vendor_code = candidate.card.vendor_code.clone();
            match self.price_and_store(&model, &mut markup, &prices, candidate, cost).await {
                Ok(key) => {
                    log::debug!("Saved {key} ({vendor_code})");
                    summary.saved += 1;
                }
                Err(reason) => summary.skip(vendor_code, reason),
            }
            done += 1;
            match &pb {
                Some(pb) => pb.inc(1),
                None if done % LOG_EVERY == 0 => log::info!("{done}/{total} cards processed"),
                None => (),
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        summary.scrapes = cache.fetch_count();
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    async fn price_and_store(
        &self,
        model: &PricingModel,
        markup: &mut DisplayMarkup,
        prices: &PriceBook,
        candidate: Candidate,
        cost: Result<ScrapedCost, ScrapeError>,
    ) -> Result<RecordKey, SkipReason> {
        let Candidate { card, sku, decoded } = candidate;
        let cost = cost?;
        let amounts = model.price(&card.dimensions, cost.base_price, decoded.pack_count)?;
        let display = markup.apply(amounts.solved_price)?;
        let key = RecordKey {
            product_id: decoded.product_id,
            pack_count: decoded.pack_count,
        };
        let record = PricedRecord {
            key: key.clone(),
            nm_id: card.nm_id,
            marketplace_price: prices.get(&card.vendor_code),
            vendor_code: card.vendor_code,
            title: card.title,
            sku,
            dimensions: card.dimensions,
            stock_locations: cost.stock_locations,
            cost: amounts.cost,
            tariff: amounts.tariff,
            commission: amounts.commission,
            solved_price: amounts.solved_price,
            display_price: display.price,
            display_discount: display.discount,
        };
        self.repo.upsert(record).await.map_err(SkipReason::Store)?;
        Ok(key)
    }
}
