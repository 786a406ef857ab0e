use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Account, AccountId, Coupon, CouponId, Credits, LedgerEntry, LedgerEntryId, NewAccount,
    NewCoupon, NewLedgerEntry, RecordStoreError, Result, store::RecordStore,
};

const COUPON_COLUMNS: &str = "id, seller_id, buyer_id, title, description, code, price_credits, \
     category, expiry_date, image_url, created_at";

/// PostgreSQL-backed record store implementation.
///
/// Each method is one statement. Conditional writes are expressed as
/// `UPDATE ... WHERE <predicate>` and report whether a row was affected, so
/// they stay atomic without an enclosing transaction.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Creates a new PostgreSQL record store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn credits(table: &'static str, amount: i64) -> Result<Credits> {
        Credits::new(amount).map_err(|e| RecordStoreError::InvalidRecord {
            table,
            reason: e.to_string(),
        })
    }

    fn row_to_account(row: PgRow) -> Result<Account> {
        Ok(Account {
            id: AccountId::from_uuid(row.try_get::<Uuid, _>("id")?),
            email: row.try_get("email")?,
            credits: Self::credits("accounts", row.try_get("credits")?)?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_coupon(row: PgRow) -> Result<Coupon> {
        Ok(Coupon {
            id: CouponId::from_uuid(row.try_get::<Uuid, _>("id")?),
            seller_id: AccountId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            buyer_id: row
                .try_get::<Option<Uuid>, _>("buyer_id")?
                .map(AccountId::from_uuid),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            code: row.try_get("code")?,
            price: Self::credits("coupons", row.try_get("price_credits")?)?,
            category: row.try_get("category")?,
            expiry_date: row.try_get("expiry_date")?,
            image_url: row.try_get("image_url")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_ledger_entry(row: PgRow) -> Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            buyer_id: AccountId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            seller_id: AccountId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            amount: Self::credits("ledger_entries", row.try_get("amount_credits")?)?,
            coupon_id: CouponId::from_uuid(row.try_get::<Uuid, _>("coupon_id")?),
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Maps constraint violations to `Constraint`, keeping everything else as a
/// database error.
fn map_write_error(e: sqlx::Error) -> RecordStoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.is_check_violation())
    {
        return RecordStoreError::Constraint(db_err.message().to_string());
    }
    RecordStoreError::Database(e)
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        let row = sqlx::query(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_coupon).transpose()
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT id, email, credits, created_at FROM accounts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_account).transpose()
    }

    async fn debit_account(&self, id: AccountId, amount: Credits) -> Result<Option<Credits>> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts SET credits = credits - $2
            WHERE id = $1 AND credits >= $2
            RETURNING credits
            "#,
        )
        .bind(id.as_uuid())
        .bind(amount.amount())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        balance.map(|b| Self::credits("accounts", b)).transpose()
    }

    async fn credit_account(&self, id: AccountId, amount: Credits) -> Result<Option<Credits>> {
        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE accounts SET credits = credits + $2 WHERE id = $1 RETURNING credits",
        )
        .bind(id.as_uuid())
        .bind(amount.amount())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        balance.map(|b| Self::credits("accounts", b)).transpose()
    }

    async fn mark_coupon_sold(&self, id: CouponId, buyer_id: AccountId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE coupons SET is_sold = TRUE, buyer_id = $2
            WHERE id = $1 AND is_sold = FALSE
            "#,
        )
        .bind(id.as_uuid())
        .bind(buyer_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn unmark_coupon_sold(&self, id: CouponId, buyer_id: AccountId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE coupons SET is_sold = FALSE, buyer_id = NULL
            WHERE id = $1 AND is_sold = TRUE AND buyer_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(buyer_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_ledger_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO ledger_entries (id, buyer_id, seller_id, amount_credits, coupon_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING created_at
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.buyer_id.as_uuid())
        .bind(entry.seller_id.as_uuid())
        .bind(entry.amount.amount())
        .bind(entry.coupon_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(entry.into_entry(created_at))
    }

    async fn delete_ledger_entry(&self, id: LedgerEntryId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ledger_entries WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ledger_entries_for_coupon(&self, coupon_id: CouponId) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, buyer_id, seller_id, amount_credits, coupon_id, created_at
            FROM ledger_entries
            WHERE coupon_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(coupon_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_ledger_entry).collect()
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (id, email, credits)
            VALUES ($1, $2, $3)
            RETURNING id, email, credits, created_at
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.email)
        .bind(account.credits.amount())
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Self::row_to_account(row)
    }

    async fn insert_coupon(&self, coupon: NewCoupon) -> Result<Coupon> {
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO coupons
                (id, seller_id, title, description, code, price_credits, category, expiry_date, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING created_at
            "#,
        )
        .bind(coupon.id.as_uuid())
        .bind(coupon.seller_id.as_uuid())
        .bind(&coupon.title)
        .bind(&coupon.description)
        .bind(&coupon.code)
        .bind(coupon.price.amount())
        .bind(&coupon.category)
        .bind(coupon.expiry_date)
        .bind(&coupon.image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(coupon.into_coupon(created_at))
    }

    async fn sold_coupons_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Coupon>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COUPON_COLUMNS} FROM coupons
            WHERE is_sold = TRUE AND expiry_date >= $1 AND expiry_date < $2
            ORDER BY expiry_date ASC
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_coupon).collect()
    }
}
