#![allow(clippy::let_and_return)]

use async_trait::async_trait;
use pricing_types::{Dimensions, PriceQuote, PricedRecord, RecordKey};
use rusqlite::{Transaction, TransactionBehavior};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio_rusqlite::Connection;

#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Inserts the record or replaces every field of the row with the same key.
    async fn upsert(&self, record: PricedRecord) -> Result<(), anyhow::Error>;
    async fn get_one(&self, key: &RecordKey) -> Result<Option<PricedRecord>, anyhow::Error>;
    async fn list(&self) -> Result<Vec<PricedRecord>, anyhow::Error>;
    async fn count(&self) -> Result<usize, anyhow::Error>;
}

const COLUMNS: &str = "product_id, pcs, nm_id, vendor_code, title, skus, width, height, length,
    price, discounted_price, club_discounted_price, available_count, cost, tariff, commission,
    ok_price, new_price, new_discount, dims_valid";

fn to_real(d: Decimal) -> Option<f64> {
    d.to_f64()
}

fn from_real(f: f64) -> Decimal {
    Decimal::from_f64(f).unwrap_or_default()
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PricedRecord> {
    let price: Option<f64> = row.get(9)?;
    let discounted: Option<f64> = row.get(10)?;
    let loyalty: Option<f64> = row.get(11)?;
    let marketplace_price = match (price, discounted, loyalty) {
        (None, None, None) => None,
        (p, d, l) => Some(PriceQuote {
            list: p.map(from_real).unwrap_or_default(),
            discounted: d.map(from_real).unwrap_or_default(),
            loyalty: l.map(from_real).unwrap_or_default(),
        }),
    };
    Ok(PricedRecord {
        key: RecordKey {
            product_id: row.get(0)?,
            pack_count: row.get(1)?,
        },
        nm_id: row.get::<_, i64>(2)? as u64,
        vendor_code: row.get(3)?,
        title: row.get(4)?,
        sku: row.get(5)?,
        dimensions: Dimensions {
            width: row.get(6)?,
            height: row.get(7)?,
            length: row.get(8)?,
            is_valid: row.get(19)?,
        },
        marketplace_price,
        stock_locations: row.get(12)?,
        cost: row.get(13)?,
        tariff: from_real(row.get(14)?),
        commission: row.get(15)?,
        solved_price: from_real(row.get(16)?),
        display_price: row.get(17)?,
        display_discount: row.get(18)?,
    })
}

pub struct SqliteRecordRepository {
    conn: Connection,
}

impl SqliteRecordRepository {
    /// Recreates the `products` table; rows from earlier runs are discarded.
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            let _ = conn.pragma_update(None, "journal_mode", "WAL");
            let _ = conn.pragma_update(None, "synchronous", "NORMAL");
            let _ = conn.pragma_update(None, "busy_timeout", 5000i64);
            let conn = Transaction::new(conn, TransactionBehavior::Deferred)?;
            conn.execute("DROP TABLE IF EXISTS products", [])?;
            conn.execute(
                "CREATE TABLE products (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    product_id TEXT NOT NULL,
                    pcs INTEGER NOT NULL,
                    nm_id INTEGER NOT NULL,
                    vendor_code TEXT NOT NULL,
                    title TEXT NOT NULL,
                    skus TEXT NOT NULL,
                    width INTEGER NOT NULL,
                    height INTEGER NOT NULL,
                    length INTEGER NOT NULL,
                    price REAL,
                    discounted_price REAL,
                    club_discounted_price REAL,
                    available_count INTEGER NOT NULL,
                    cost INTEGER NOT NULL,
                    tariff REAL NOT NULL,
                    commission INTEGER NOT NULL,
                    ok_price REAL NOT NULL,
                    new_price INTEGER NOT NULL,
                    new_discount INTEGER NOT NULL,
                    dims_valid INTEGER NOT NULL,
                    UNIQUE (product_id, pcs)
                )",
                [],
            )?;
            conn.commit()?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RecordRepository for SqliteRecordRepository {
    async fn upsert(&self, r: PricedRecord) -> Result<(), anyhow::Error> {
        self.conn
            .call(move |conn| {
                let quote = r.marketplace_price;
                conn.execute(
                    &format!(
                        "INSERT INTO products ({COLUMNS})
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
                        ON CONFLICT(product_id, pcs) DO UPDATE SET
                            nm_id = excluded.nm_id,
                            vendor_code = excluded.vendor_code,
                            title = excluded.title,
                            skus = excluded.skus,
                            width = excluded.width,
                            height = excluded.height,
                            length = excluded.length,
                            price = excluded.price,
                            discounted_price = excluded.discounted_price,
                            club_discounted_price = excluded.club_discounted_price,
                            available_count = excluded.available_count,
                            cost = excluded.cost,
                            tariff = excluded.tariff,
                            commission = excluded.commission,
                            ok_price = excluded.ok_price,
                            new_price = excluded.new_price,
                            new_discount = excluded.new_discount,
                            dims_valid = excluded.dims_valid"
                    ),
                    rusqlite::params![
                        r.key.product_id,
                        r.key.pack_count,
                        r.nm_id as i64,
                        r.vendor_code,
                        r.title,
                        r.sku,
                        r.dimensions.width,
                        r.dimensions.height,
                        r.dimensions.length,
                        quote.and_then(|q| to_real(q.list)),
                        quote.and_then(|q| to_real(q.discounted)),
                        quote.and_then(|q| to_real(q.loyalty)),
                        r.stock_locations,
                        r.cost,
                        to_real(r.tariff).unwrap_or_default(),
                        r.commission,
                        to_real(r.solved_price).unwrap_or_default(),
                        r.display_price,
                        r.display_discount,
                        r.dimensions.is_valid,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get_one(&self, key: &RecordKey) -> Result<Option<PricedRecord>, anyhow::Error> {
        let key = key.clone();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM products WHERE product_id = ?1 AND pcs = ?2"
                ))?;
                let mut r = stmt
                    .query_map(rusqlite::params![key.product_id, key.pack_count], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(r.pop())
            })
            .await?)
    }

    async fn list(&self) -> Result<Vec<PricedRecord>, anyhow::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let r = {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM products ORDER BY product_id, pcs"
                    ))?;
                    let r = stmt
                        .query_map([], row_to_record)?
                        .collect::<Result<Vec<_>, _>>()?;
                    r
                };
                Ok(r)
            })
            .await?)
    }

    async fn count(&self) -> Result<usize, anyhow::Error> {
        Ok(self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await?)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use rust_decimal_macros::dec;

    pub fn record(product_id: &str, pack_count: u32, solved_price: Decimal) -> PricedRecord {
        PricedRecord {
            key: RecordKey {
                product_id: product_id.to_string(),
                pack_count,
            },
            nm_id: 123456,
            vendor_code: format!("box_{product_id}_{pack_count}"),
            title: "Коробка".to_string(),
            sku: "2040000000001".to_string(),
            dimensions: Dimensions {
                width: 10,
                height: 10,
                length: 10,
                is_valid: true,
            },
            marketplace_price: Some(PriceQuote {
                list: dec!(1500),
                discounted: dec!(1200.5),
                loyalty: dec!(1150),
            }),
            stock_locations: 3,
            cost: 123,
            tariff: dec!(50),
            commission: 36,
            solved_price,
            display_price: 645,
            display_discount: 28,
        }
    }

    async fn repo() -> SqliteRecordRepository {
        let conn = Connection::open_in_memory().await.expect("in-memory db");
        SqliteRecordRepository::init(conn).await.expect("schema")
    }

    #[tokio::test]
    async fn stores_and_reads_record() {
        let repo = repo().await;
        let r = record("4821", 3, dec!(461.54));
        repo.upsert(r.clone()).await.expect("upsert");
        let stored = repo.get_one(r.key()).await.expect("get").expect("present");
        assert_eq!(r, stored);
        assert_eq!(None, repo.get_one(&RecordKey { product_id: "4821".to_string(), pack_count: 1 }).await.expect("get"));
    }

    #[tokio::test]
    async fn keeps_invalid_dimensions_flag() {
        let repo = repo().await;
        let mut r = record("4821", 1, dec!(461.54));
        r.dimensions.is_valid = false;
        repo.upsert(r.clone()).await.expect("upsert");
        let stored = repo.get_one(r.key()).await.expect("get").expect("present");
        assert!(!stored.dimensions.is_valid);
        assert_eq!(r, stored);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_last_write_wins() {
        let repo = repo().await;
        repo.upsert(record("4821", 3, dec!(461.54))).await.expect("upsert");
        let mut second = record("4821", 3, dec!(500));
        second.marketplace_price = None;
        second.title = "Коробка 2".to_string();
        repo.upsert(second.clone()).await.expect("upsert");
        repo.upsert(record("4821", 1, dec!(200))).await.expect("upsert");
        assert_eq!(2, repo.count().await.expect("count"));
        let stored = repo.get_one(second.key()).await.expect("get").expect("present");
        assert_eq!(second, stored);
        let all = repo.list().await.expect("list");
        assert_eq!(vec![1, 3], all.iter().map(|r| r.key.pack_count).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn init_discards_previous_rows() {
        let conn = Connection::open_in_memory().await.expect("in-memory db");
        let repo = SqliteRecordRepository::init(conn.clone()).await.expect("schema");
        repo.upsert(record("4821", 3, dec!(461.54))).await.expect("upsert");
        let repo = SqliteRecordRepository::init(conn).await.expect("schema");
        assert_eq!(0, repo.count().await.expect("count"));
    }
}
