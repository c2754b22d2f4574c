//! Ledger service
//!
//! Single writer of company balances. Every money movement is one atomic
//! unit: the transaction row insert and the cached-balance update commit
//! together or not at all. Writers to the same company serialize through an
//! optimistic compare-and-swap on the company's version column; writers to
//! different companies never conflict.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::{ActorContext, Amount, Balance, DomainError, MINOR_SCALE};
use crate::error::{AppError, AppResult};

use super::{
    BalanceReconciliation, RecordTransaction, TransactionFilter, TransactionRecord,
    TransactionType, UpdateTransactionMetadata,
};

/// Bounded CAS retries before giving up with a 409.
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Handler for company ledger operations.
#[derive(Clone)]
pub struct LedgerService {
    pool: SqlitePool,
}

impl LedgerService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a company, optionally seeded with an opening credit. The
    /// company row and its opening transaction commit in the same atomic
    /// unit, so a failed creation leaves neither behind.
    pub async fn open_company(
        &self,
        name: &str,
        opening: Option<Amount>,
        actor: &ActorContext,
    ) -> AppResult<Uuid> {
        let company_id = Uuid::new_v4();
        let now = Utc::now();
        let balance_minor = opening.map_or(0, |amount| amount.minor());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO companies (id, name, balance_minor, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, 0, ?4, ?4)
            "#,
        )
        .bind(company_id)
        .bind(name)
        .bind(balance_minor)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let Some(amount) = opening {
            sqlx::query(
                r#"
                INSERT INTO transactions
                    (id, company_id, amount_minor, entry_type, description,
                     order_number, created_by, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(company_id)
            .bind(amount.minor())
            .bind(TransactionType::Credit.as_str())
            .bind("Opening balance")
            .bind(actor.user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(company_id)
    }

    /// Record a money movement and atomically adjust the company's cached
    /// balance. Returns the created record and the resulting balance.
    pub async fn record_transaction(
        &self,
        command: RecordTransaction,
        actor: &ActorContext,
    ) -> AppResult<(TransactionRecord, Balance)> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            // Snapshot of the balance the non-negative check runs against.
            let company: Option<(i64, i64)> =
                sqlx::query_as("SELECT balance_minor, version FROM companies WHERE id = ?1")
                    .bind(command.company_id)
                    .fetch_optional(&self.pool)
                    .await?;

            let (balance_minor, version) = company
                .ok_or_else(|| AppError::CompanyNotFound(command.company_id.to_string()))?;

            let current = Balance::from_minor(balance_minor).map_err(|e| {
                AppError::Internal(format!(
                    "corrupt balance for company {}: {e}",
                    command.company_id
                ))
            })?;

            let new_balance = match command.entry_type {
                TransactionType::Credit => {
                    current.credit(&command.amount).map_err(DomainError::from)?
                }
                TransactionType::Debit => current.debit(&command.amount).map_err(|_| {
                    DomainError::insufficient_funds(
                        command.amount.as_decimal(),
                        current.as_decimal(),
                    )
                })?,
            };

            let transaction_id = Uuid::new_v4();
            let now = Utc::now();

            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO transactions
                    (id, company_id, amount_minor, entry_type, description,
                     order_number, created_by, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(transaction_id)
            .bind(command.company_id)
            .bind(command.amount.minor())
            .bind(command.entry_type.as_str())
            .bind(&command.description)
            .bind(&command.order_number)
            .bind(actor.user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            // CAS: only lands if no other writer advanced this company since
            // the snapshot read above.
            let updated = sqlx::query(
                r#"
                UPDATE companies
                SET balance_minor = ?1, version = version + 1, updated_at = ?2
                WHERE id = ?3 AND version = ?4
                "#,
            )
            .bind(new_balance.minor())
            .bind(now)
            .bind(command.company_id)
            .bind(version)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 1 {
                tx.commit().await?;

                let record = TransactionRecord {
                    id: transaction_id,
                    company_id: command.company_id,
                    amount: command.amount,
                    entry_type: command.entry_type,
                    description: command.description,
                    order_number: command.order_number,
                    created_by: actor.user_id,
                    created_by_name: actor.name.clone(),
                    created_at: now,
                };
                return Ok((record, new_balance));
            }

            // Lost the race; discard the insert and retry on a fresh snapshot.
            tx.rollback().await?;
        }

        Err(AppError::VersionConflict)
    }

    /// Update the non-financial fields of a transaction. Amount and company
    /// are immutable; a type change re-derives the company balance through
    /// the same CAS path so the cached balance never drifts from the log.
    pub async fn update_transaction(
        &self,
        transaction_id: Uuid,
        update: UpdateTransactionMetadata,
    ) -> AppResult<TransactionRecord> {
        if update.is_empty() {
            return self.get_transaction(transaction_id).await;
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let row: Option<(Uuid, i64, String)> = sqlx::query_as(
                "SELECT company_id, amount_minor, entry_type FROM transactions WHERE id = ?1",
            )
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

            let (company_id, amount_minor, stored_type) =
                row.ok_or_else(|| AppError::TransactionNotFound(transaction_id.to_string()))?;

            let current_type: TransactionType = stored_type
                .parse()
                .map_err(|_| AppError::Internal(format!("corrupt entry_type: {stored_type}")))?;
            let amount = Amount::from_minor(amount_minor)
                .map_err(|e| AppError::Internal(format!("corrupt amount: {e}")))?;

            let new_type = update.entry_type.unwrap_or(current_type);

            if new_type == current_type {
                // Pure metadata change, no balance effect.
                let changed = sqlx::query(
                    r#"
                    UPDATE transactions
                    SET description = COALESCE(?1, description),
                        order_number = COALESCE(?2, order_number)
                    WHERE id = ?3
                    "#,
                )
                .bind(&update.description)
                .bind(&update.order_number)
                .bind(transaction_id)
                .execute(&self.pool)
                .await?;

                if changed.rows_affected() == 0 {
                    return Err(AppError::TransactionNotFound(transaction_id.to_string()));
                }
                return self.get_transaction(transaction_id).await;
            }

            // Reversing the old effect and applying the new one moves the
            // balance by twice the amount in the new direction.
            let delta = new_type.signed_minor(&amount) - current_type.signed_minor(&amount);

            let company: Option<(i64, i64)> =
                sqlx::query_as("SELECT balance_minor, version FROM companies WHERE id = ?1")
                    .bind(company_id)
                    .fetch_optional(&self.pool)
                    .await?;
            let (balance_minor, version) =
                company.ok_or_else(|| AppError::CompanyNotFound(company_id.to_string()))?;

            let current = Balance::from_minor(balance_minor)
                .map_err(|e| AppError::Internal(format!("corrupt balance: {e}")))?;
            let new_balance_minor = balance_minor + delta;
            if new_balance_minor < 0 {
                return Err(
                    DomainError::insufficient_funds(amount.as_decimal(), current.as_decimal())
                        .into(),
                );
            }
            let new_balance = Balance::from_minor(new_balance_minor).map_err(DomainError::from)?;

            let mut tx = self.pool.begin().await?;

            // Guard on the old type so a concurrent flip cannot apply twice.
            let changed = sqlx::query(
                r#"
                UPDATE transactions
                SET description = COALESCE(?1, description),
                    order_number = COALESCE(?2, order_number),
                    entry_type = ?3
                WHERE id = ?4 AND entry_type = ?5
                "#,
            )
            .bind(&update.description)
            .bind(&update.order_number)
            .bind(new_type.as_str())
            .bind(transaction_id)
            .bind(current_type.as_str())
            .execute(&mut *tx)
            .await?;

            if changed.rows_affected() == 0 {
                tx.rollback().await?;
                continue;
            }

            let updated = sqlx::query(
                r#"
                UPDATE companies
                SET balance_minor = ?1, version = version + 1, updated_at = ?2
                WHERE id = ?3 AND version = ?4
                "#,
            )
            .bind(new_balance.minor())
            .bind(Utc::now())
            .bind(company_id)
            .bind(version)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 1 {
                tx.commit().await?;
                return self.get_transaction(transaction_id).await;
            }

            tx.rollback().await?;
        }

        Err(AppError::VersionConflict)
    }

    /// Fetch a single transaction with attribution resolved.
    pub async fn get_transaction(&self, transaction_id: Uuid) -> AppResult<TransactionRecord> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT t.id, t.company_id, t.amount_minor, t.entry_type, t.description,
                   t.order_number, t.created_by, u.name, t.created_at
            FROM transactions t
            JOIN users u ON u.id = t.created_by
            WHERE t.id = ?1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::TransactionNotFound(transaction_id.to_string()))?
            .try_into()
    }

    /// List transactions, newest first, optionally filtered by company
    /// and type. Read-only.
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> AppResult<Vec<TransactionRecord>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT t.id, t.company_id, t.amount_minor, t.entry_type, t.description,
                   t.order_number, t.created_by, u.name, t.created_at
            FROM transactions t
            JOIN users u ON u.id = t.created_by
            WHERE (?1 IS NULL OR t.company_id = ?1)
              AND (?2 IS NULL OR t.entry_type = ?2)
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(filter.company_id)
        .bind(filter.entry_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Invariant check: compare the cached balance against the signed sum of
    /// the company's committed transactions.
    pub async fn recompute_balance(&self, company_id: Uuid) -> AppResult<BalanceReconciliation> {
        let cached: Option<i64> =
            sqlx::query_scalar("SELECT balance_minor FROM companies WHERE id = ?1")
                .bind(company_id)
                .fetch_optional(&self.pool)
                .await?;
        let cached = cached.ok_or_else(|| AppError::CompanyNotFound(company_id.to_string()))?;

        let summed: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(
                CASE WHEN entry_type = 'credit' THEN amount_minor ELSE -amount_minor END
            ), 0)
            FROM transactions
            WHERE company_id = ?1
            "#,
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(BalanceReconciliation {
            company_id,
            cached_balance: rust_decimal::Decimal::new(cached, MINOR_SCALE),
            ledger_balance: rust_decimal::Decimal::new(summed, MINOR_SCALE),
            consistent: cached == summed,
        })
    }
}

/// Raw joined row, decoded before domain validation.
type TransactionRow = (
    Uuid,
    Uuid,
    i64,
    String,
    Option<String>,
    Option<String>,
    Uuid,
    String,
    chrono::DateTime<Utc>,
);

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let (
            id,
            company_id,
            amount_minor,
            entry_type,
            description,
            order_number,
            created_by,
            created_by_name,
            created_at,
        ) = row;

        Ok(TransactionRecord {
            id,
            company_id,
            amount: Amount::from_minor(amount_minor)
                .map_err(|e| AppError::Internal(format!("corrupt amount: {e}")))?,
            entry_type: entry_type
                .parse()
                .map_err(|_| AppError::Internal(format!("corrupt entry_type: {entry_type}")))?,
            description,
            order_number,
            created_by,
            created_by_name,
            created_at,
        })
    }
}
