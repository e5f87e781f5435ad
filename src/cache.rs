use pricing_types::ScrapedCost;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use supplier_parser::{product_url, PageRenderer, ScrapeError};
use tokio::sync::{Mutex, OnceCell};

/// Run-scoped memo of supplier page scrapes keyed by product id.
///
/// Concurrent requests for one id share a single in-flight fetch. A failed
/// fetch leaves the slot empty, so the next request tries again.
pub struct ScrapeCache {
    renderer: Arc<dyn PageRenderer>,
    base_url: String,
    entries: Mutex<HashMap<String, Arc<OnceCell<ScrapedCost>>>>,
    fetches: AtomicUsize,
}

impl ScrapeCache {
    pub fn new(renderer: Arc<dyn PageRenderer>, base_url: String) -> Self {
        Self {
            renderer,
            base_url,
            entries: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub async fn fetch(&self, product_id: &str) -> Result<ScrapedCost, ScrapeError> {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(product_id.to_string()).or_default().clone()
        };
        if let Some(cost) = cell.get() {
            log::debug!("Using cached page data for {product_id}");
            return Ok(*cost);
        }
        let cost = cell
            .get_or_try_init(|| async move {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                let url = product_url(&self.base_url, product_id);
                log::info!("Scraping {url}");
                self.renderer.fetch(&url).await?.into_cost()
            })
            .await?;
        Ok(*cost)
    }

    /// Number of times the renderer has been invoked.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use async_trait::async_trait;
    use pricing_types::Url;
    use rust_decimal_macros::dec;
    use supplier_parser::PageResult;

    /// Fails the first `failures` calls, then serves a fixed page.
    pub struct StubRenderer {
        pub calls: AtomicUsize,
        pub failures: usize,
    }

    #[async_trait]
    impl PageRenderer for StubRenderer {
        async fn fetch(&self, url: &Url) -> Result<PageResult, ScrapeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if call < self.failures {
                return Err(ScrapeError::MissingPrice(url.clone()));
            }
            Ok(PageResult {
                price_text: "1 234,5 р".to_string(),
                stock_locations: 4,
            })
        }
    }

    fn cache(failures: usize) -> (Arc<StubRenderer>, ScrapeCache) {
        let renderer = Arc::new(StubRenderer {
            calls: AtomicUsize::new(0),
            failures,
        });
        let cache = ScrapeCache::new(renderer.clone(), "https://sp.cargo-avto.ru/catalog/".to_string());
        (renderer, cache)
    }

    #[tokio::test]
    async fn fetches_each_id_once() {
        let (renderer, cache) = cache(0);
        for _ in 0..5 {
            let cost = cache.fetch("4821").await.expect("cost");
            assert_eq!(dec!(1234.5), cost.base_price);
            assert_eq!(4, cost.stock_locations);
        }
        cache.fetch("4822").await.expect("cost");
        assert_eq!(2, renderer.calls.load(Ordering::SeqCst));
        assert_eq!(2, cache.fetch_count());
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let (renderer, cache) = cache(0);
        let results = futures::future::join_all((0..8).map(|_| cache.fetch("4821"))).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(1, renderer.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let (renderer, cache) = cache(1);
        assert!(cache.fetch("4821").await.is_err());
        assert!(cache.fetch("4821").await.is_ok());
        assert!(cache.fetch("4821").await.is_ok());
        assert_eq!(2, renderer.calls.load(Ordering::SeqCst));
    }
}
