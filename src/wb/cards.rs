use super::MarketplaceApi;
use derive_builder::Builder;
use pricing_types::ProductCard;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

#[derive(Serialize, Builder, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CardsCursor {
    pub limit: u32,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[builder(default)]
    #[serde(rename = "nmID", skip_serializing_if = "Option::is_none")]
    pub nm_id: Option<u64>,
}

#[derive(Serialize, Builder, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CardsFilter {
    #[builder(default = "1")]
    pub with_photo: i32,
    #[serde(rename = "objectIDs")]
    pub object_ids: Vec<u64>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CardsSettings {
    pub cursor: CardsCursor,
    pub filter: CardsFilter,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CardsListRequest {
    pub settings: CardsSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    #[serde(default)]
    pub updated_at: String,
    #[serde(default, rename = "nmID")]
    pub nm_id: u64,
    #[serde(default)]
    pub total: u64,
}

impl PageCursor {
    pub fn is_empty(&self) -> bool {
        self.updated_at.is_empty() || self.nm_id == 0
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CardsPage {
    #[serde(default)]
    pub cards: Vec<ProductCard>,
    #[serde(default)]
    pub cursor: PageCursor,
}

#[derive(Clone, Debug)]
pub struct WalkOptions {
    pub category_ids: Vec<u64>,
    pub page_size: u32,
    pub with_photo: i32,
}

impl WalkOptions {
    pub fn request(&self, cursor: Option<&PageCursor>) -> Result<CardsListRequest, anyhow::Error> {
        let cursor = CardsCursorBuilder::default()
            .limit(self.page_size)
            .updated_at(cursor.map(|c| c.updated_at.clone()))
            .nm_id(cursor.map(|c| c.nm_id))
            .build()?;
        let filter = CardsFilterBuilder::default()
            .with_photo(self.with_photo)
            .object_ids(self.category_ids.clone())
            .build()?;
        Ok(CardsListRequest {
            settings: CardsSettings { cursor, filter },
        })
    }
}

/// Drains the catalog listing. Upstream failures end the walk with the cards
/// gathered so far; cards repeated across pages are kept once.
pub async fn walk(
    api: &dyn MarketplaceApi,
    opts: &WalkOptions,
    token: &CancellationToken,
) -> Result<Vec<ProductCard>, anyhow::Error> {
    let mut cards: Vec<ProductCard> = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor: Option<PageCursor> = None;
    loop {
        let request = opts.request(cursor.as_ref())?;
        let page = tokio::select! {
            biased;
            _ = token.cancelled() => {
                log::info!("Catalog walk cancelled after {} cards", cards.len());
                break;
            }
            page = api.cards_page(&request) => page,
        };
        let page = match page {
            Ok(page) => page,
            Err(err) => {
                log::warn!(
                    "Unable to fetch cards page, keeping {} cards: {err:?}",
                    cards.len()
                );
                break;
            }
        };
        if page.cards.is_empty() {
            break;
        }
        let fetched = page.cards.len();
        cards.extend(page.cards.into_iter().filter(|c| seen.insert(c.nm_id)));
        log::info!(
            "Fetched {fetched} cards, {} total of {}",
            cards.len(),
            page.cursor.total
        );
        if page.cursor.is_empty() {
            break;
        }
        cursor = Some(page.cursor);
    }
    Ok(cards)
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::wb::{CommissionEntry, GoodsPrice, PriceListRequest, WarehouseTariff};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use pricing_types::Dimensions;
    use std::sync::Mutex;
    use time::Date;

    pub fn card(nm_id: u64, vendor_code: &str) -> ProductCard {
        ProductCard {
            nm_id,
            vendor_code: vendor_code.to_string(),
            title: format!("card {nm_id}"),
            updated_at: "2025-01-20T10:00:00Z".to_string(),
            dimensions: Dimensions {
                width: 10,
                height: 10,
                length: 10,
                is_valid: true,
            },
            sizes: vec![pricing_types::SizeVariant {
                skus: vec![format!("20{nm_id}")],
            }],
        }
    }

    /// Serves pages from a script; `None` entries fail the request.
    struct ScriptedCards {
        pages: Mutex<Vec<Option<CardsPage>>>,
        requests: Mutex<Vec<CardsListRequest>>,
    }

    impl ScriptedCards {
        fn new(mut pages: Vec<Option<CardsPage>>) -> Self {
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                requests: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl MarketplaceApi for ScriptedCards {
        async fn box_tariffs(&self, _: Date) -> Result<Vec<WarehouseTariff>, anyhow::Error> {
            Err(anyhow!("unused"))
        }

        async fn commissions(&self) -> Result<Vec<CommissionEntry>, anyhow::Error> {
            Err(anyhow!("unused"))
        }

        async fn cards_page(&self, request: &CardsListRequest) -> Result<CardsPage, anyhow::Error> {
            self.requests.lock().expect("lock").push(request.clone());
            match self.pages.lock().expect("lock").pop() {
                Some(Some(page)) => Ok(page),
                Some(None) => Err(anyhow!("upstream failure")),
                None => Ok(CardsPage::default()),
            }
        }

        async fn prices_page(&self, _: &PriceListRequest) -> Result<Vec<GoodsPrice>, anyhow::Error> {
            Err(anyhow!("unused"))
        }
    }

    fn page(ids: std::ops::Range<u64>) -> CardsPage {
        let last = ids.end.saturating_sub(1);
        CardsPage {
            cards: ids.map(|id| card(id, &format!("box_{id}_1"))).collect(),
            cursor: PageCursor {
                updated_at: "2025-01-20T10:00:00Z".to_string(),
                nm_id: last,
                total: 0,
            },
        }
    }

    fn opts() -> WalkOptions {
        WalkOptions {
            category_ids: vec![3979],
            page_size: 3,
            with_photo: 1,
        }
    }

    #[test]
    fn serializes_first_and_next_requests() {
        let first = serde_json::to_value(opts().request(None).expect("request")).expect("json");
        assert_eq!(
            serde_json::json!({"settings": {
                "cursor": {"limit": 3},
                "filter": {"withPhoto": 1, "objectIDs": [3979]}
            }}),
            first
        );
        let cursor = PageCursor {
            updated_at: "2025-01-20T10:00:00Z".to_string(),
            nm_id: 42,
            total: 10,
        };
        let next = serde_json::to_value(opts().request(Some(&cursor)).expect("request")).expect("json");
        assert_eq!(
            serde_json::json!({"limit": 3, "updatedAt": "2025-01-20T10:00:00Z", "nmID": 42}),
            next["settings"]["cursor"]
        );
    }

    #[tokio::test]
    async fn terminates_on_decreasing_pages() {
        let api = ScriptedCards::new(vec![
            Some(page(1..4)),
            Some(page(4..6)),
            Some(page(6..7)),
            Some(page(7..7)),
        ]);
        let cards = walk(&api, &opts(), &CancellationToken::new())
            .await
            .expect("walk");
        assert_eq!(6, cards.len());
        let requests = api.requests.lock().expect("lock");
        assert_eq!(4, requests.len());
        assert_eq!(None, requests[0].settings.cursor.nm_id);
        assert_eq!(Some(3), requests[1].settings.cursor.nm_id);
        assert_eq!(Some(6), requests[3].settings.cursor.nm_id);
    }

    #[tokio::test]
    async fn stops_on_empty_cursor() {
        let mut last = page(4..6);
        last.cursor.updated_at = String::new();
        let api = ScriptedCards::new(vec![Some(page(1..4)), Some(last), Some(page(6..9))]);
        let cards = walk(&api, &opts(), &CancellationToken::new())
            .await
            .expect("walk");
        assert_eq!(5, cards.len());
        assert_eq!(2, api.requests.lock().expect("lock").len());
    }

    #[tokio::test]
    async fn keeps_accumulated_cards_on_failure() {
        let api = ScriptedCards::new(vec![Some(page(1..4)), None, Some(page(4..7))]);
        let cards = walk(&api, &opts(), &CancellationToken::new())
            .await
            .expect("walk");
        assert_eq!(vec![1, 2, 3], cards.iter().map(|c| c.nm_id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn drops_repeated_cards() {
        let api = ScriptedCards::new(vec![Some(page(1..4)), Some(page(3..5)), Some(page(5..5))]);
        let cards = walk(&api, &opts(), &CancellationToken::new())
            .await
            .expect("walk");
        assert_eq!(vec![1, 2, 3, 4], cards.iter().map(|c| c.nm_id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn cancelled_walk_returns_nothing_new() {
        let api = ScriptedCards::new(vec![Some(page(1..4))]);
        let token = CancellationToken::new();
        token.cancel();
        let cards = walk(&api, &opts(), &token).await.expect("walk");
        assert!(cards.is_empty());
        assert!(api.requests.lock().expect("lock").is_empty());
    }
}
