//! API Routes
//!
//! HTTP endpoint definitions for companies and ledger transactions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::{ActorContext, Amount, DomainError, MINOR_SCALE};
use crate::error::{AppError, AppResult};
use crate::ledger::{
    BalanceReconciliation, LedgerService, RecordTransaction, TransactionFilter, TransactionRecord,
    TransactionType, UpdateTransactionMetadata,
};

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    /// Accepted as a JSON number or decimal string. Recorded as an opening
    /// credit transaction, never as a raw balance write.
    #[serde(default)]
    pub initial_balance: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateCompanyRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Not updatable: the ledger service is the only balance writer.
    #[serde(default)]
    pub balance: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CompanyResponse {
    pub id: Uuid,
    pub name: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CompaniesListResponse {
    pub companies: Vec<CompanyResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub company_id: Uuid,
    /// Accepted as a JSON number or decimal string.
    pub amount: serde_json::Value,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateTransactionRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(rename = "type", default)]
    pub entry_type: Option<String>,
    // Financial fields are immutable; present values are rejected explicitly
    // rather than silently ignored.
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub company_id: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CreatedBy {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub entry_type: TransactionType,
    pub description: Option<String>,
    pub order_number: Option<String>,
    pub created_by: CreatedBy,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionResponse {
    fn from(record: TransactionRecord) -> Self {
        Self {
            id: record.id,
            company_id: record.company_id,
            amount: record.amount.as_decimal(),
            entry_type: record.entry_type,
            description: record.description,
            order_number: record.order_number,
            created_by: CreatedBy {
                id: record.created_by,
                name: record.created_by_name,
            },
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTransactionResponse {
    pub transaction: TransactionResponse,
    pub new_balance: Decimal,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionsListResponse {
    pub transactions: Vec<TransactionResponse>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(rename = "type", default)]
    pub entry_type: Option<String>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router (auth and logging layers are applied on top).
pub fn create_router() -> Router<SqlitePool> {
    Router::new()
        // Companies
        .route("/companies", post(create_company))
        .route("/companies", get(list_companies))
        .route("/companies/:company_id", get(get_company))
        .route("/companies/:company_id", put(update_company))
        .route("/companies/:company_id", delete(delete_company))
        .route("/companies/:company_id/reconcile", get(reconcile_company))
        // Ledger transactions
        .route("/transactions", post(create_transaction))
        .route("/transactions", get(list_transactions))
        .route("/transactions/:transaction_id", get(get_transaction))
        .route("/transactions/:transaction_id", put(update_transaction))
}

// =========================================================================
// POST /companies
// =========================================================================

/// Create a new company. An opening balance, when given, is recorded as an
/// opening credit in the same atomic unit as the company row, so the
/// transaction log stays the source of truth and a failure persists nothing.
async fn create_company(
    State(pool): State<SqlitePool>,
    Extension(actor): Extension<ActorContext>,
    Json(request): Json<CreateCompanyRequest>,
) -> AppResult<(StatusCode, Json<CompanyResponse>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest(
            "Company name is required".to_string(),
        ));
    }

    let opening = request
        .initial_balance
        .as_ref()
        .map(|value| Amount::try_from(value).map_err(DomainError::from))
        .transpose()?;

    let ledger = LedgerService::new(pool.clone());
    let company_id = ledger.open_company(name, opening, &actor).await?;

    let company = fetch_company(&pool, company_id).await?;
    Ok((StatusCode::CREATED, Json(company)))
}

// =========================================================================
// GET /companies
// =========================================================================

/// List all companies, newest first
async fn list_companies(
    State(pool): State<SqlitePool>,
) -> AppResult<Json<CompaniesListResponse>> {
    let rows: Vec<(Uuid, String, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, name, balance_minor, created_at, updated_at
        FROM companies
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let companies = rows
        .into_iter()
        .map(|(id, name, balance_minor, created_at, updated_at)| CompanyResponse {
            id,
            name,
            balance: Decimal::new(balance_minor, MINOR_SCALE),
            created_at,
            updated_at,
        })
        .collect();

    Ok(Json(CompaniesListResponse { companies }))
}

// =========================================================================
// GET /companies/:company_id
// =========================================================================

/// Get company by ID
async fn get_company(
    State(pool): State<SqlitePool>,
    Path(company_id): Path<Uuid>,
) -> AppResult<Json<CompanyResponse>> {
    let company = fetch_company(&pool, company_id).await?;
    Ok(Json(company))
}

// =========================================================================
// PUT /companies/:company_id
// =========================================================================

/// Rename a company. The balance field is owned by the ledger service and
/// rejected here.
async fn update_company(
    State(pool): State<SqlitePool>,
    Path(company_id): Path<Uuid>,
    Json(request): Json<UpdateCompanyRequest>,
) -> AppResult<Json<CompanyResponse>> {
    if request.balance.is_some() {
        return Err(AppError::ImmutableField("balance"));
    }

    if let Some(name) = request.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidRequest(
                "Company name is required".to_string(),
            ));
        }

        let updated = sqlx::query("UPDATE companies SET name = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(&name)
            .bind(Utc::now())
            .bind(company_id)
            .execute(&pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::CompanyNotFound(company_id.to_string()));
        }
    }

    let company = fetch_company(&pool, company_id).await?;
    Ok(Json(company))
}

// =========================================================================
// DELETE /companies/:company_id
// =========================================================================

/// Delete a company; its transactions cascade in the store.
async fn delete_company(
    State(pool): State<SqlitePool>,
    Path(company_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let deleted = sqlx::query("DELETE FROM companies WHERE id = ?1")
        .bind(company_id)
        .execute(&pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::CompanyNotFound(company_id.to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// GET /companies/:company_id/reconcile
// =========================================================================

/// Invariant check: cached balance vs. summed transaction log
async fn reconcile_company(
    State(pool): State<SqlitePool>,
    Path(company_id): Path<Uuid>,
) -> AppResult<Json<BalanceReconciliation>> {
    let ledger = LedgerService::new(pool);
    let report = ledger.recompute_balance(company_id).await?;

    if !report.consistent {
        tracing::warn!(
            company_id = %company_id,
            cached = %report.cached_balance,
            ledger = %report.ledger_balance,
            "Cached balance has drifted from the transaction log"
        );
    }

    Ok(Json(report))
}

// =========================================================================
// POST /transactions
// =========================================================================

/// Record a money movement against a company
async fn create_transaction(
    State(pool): State<SqlitePool>,
    Extension(actor): Extension<ActorContext>,
    Json(request): Json<CreateTransactionRequest>,
) -> AppResult<(StatusCode, Json<CreateTransactionResponse>)> {
    let amount = Amount::try_from(&request.amount).map_err(DomainError::from)?;
    let entry_type: TransactionType = request.entry_type.parse()?;

    let mut command = RecordTransaction::new(request.company_id, amount, entry_type);
    if let Some(description) = request.description {
        command = command.with_description(description);
    }
    if let Some(order_number) = request.order_number {
        command = command.with_order_number(order_number);
    }

    let ledger = LedgerService::new(pool);
    let (record, new_balance) = ledger.record_transaction(command, &actor).await?;

    let message = format!(
        "{} of {} recorded successfully",
        match entry_type {
            TransactionType::Credit => "Credit",
            TransactionType::Debit => "Debit",
        },
        amount.as_decimal()
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateTransactionResponse {
            transaction: record.into(),
            new_balance: new_balance.as_decimal(),
            message,
        }),
    ))
}

// =========================================================================
// GET /transactions
// =========================================================================

/// List transactions, filterable by company and type
async fn list_transactions(
    State(pool): State<SqlitePool>,
    Query(query): Query<TransactionsQuery>,
) -> AppResult<Json<TransactionsListResponse>> {
    let entry_type = query
        .entry_type
        .as_deref()
        .map(str::parse::<TransactionType>)
        .transpose()?;

    let ledger = LedgerService::new(pool);
    let records = ledger
        .list_transactions(TransactionFilter {
            company_id: query.company_id,
            entry_type,
        })
        .await?;

    Ok(Json(TransactionsListResponse {
        transactions: records.into_iter().map(Into::into).collect(),
    }))
}

// =========================================================================
// GET /transactions/:transaction_id
// =========================================================================

/// Get transaction details
async fn get_transaction(
    State(pool): State<SqlitePool>,
    Path(transaction_id): Path<Uuid>,
) -> AppResult<Json<TransactionResponse>> {
    let ledger = LedgerService::new(pool);
    let record = ledger.get_transaction(transaction_id).await?;
    Ok(Json(record.into()))
}

// =========================================================================
// PUT /transactions/:transaction_id
// =========================================================================

/// Update transaction metadata. Amount and company are immutable; a type
/// change re-derives the company balance atomically.
async fn update_transaction(
    State(pool): State<SqlitePool>,
    Path(transaction_id): Path<Uuid>,
    Json(request): Json<UpdateTransactionRequest>,
) -> AppResult<Json<TransactionResponse>> {
    if request.amount.is_some() {
        return Err(AppError::ImmutableField("amount"));
    }
    if request.company_id.is_some() {
        return Err(AppError::ImmutableField("company_id"));
    }

    let entry_type = request
        .entry_type
        .as_deref()
        .map(str::parse::<TransactionType>)
        .transpose()?;

    let ledger = LedgerService::new(pool);
    let record = ledger
        .update_transaction(
            transaction_id,
            UpdateTransactionMetadata {
                description: request.description,
                order_number: request.order_number,
                entry_type,
            },
        )
        .await?;

    Ok(Json(record.into()))
}

// =========================================================================
// Helpers
// =========================================================================

async fn fetch_company(pool: &SqlitePool, company_id: Uuid) -> AppResult<CompanyResponse> {
    let row: Option<(Uuid, String, i64, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, name, balance_minor, created_at, updated_at
        FROM companies
        WHERE id = ?1
        "#,
    )
    .bind(company_id)
    .fetch_optional(pool)
    .await?;

    let (id, name, balance_minor, created_at, updated_at) =
        row.ok_or_else(|| AppError::CompanyNotFound(company_id.to_string()))?;

    Ok(CompanyResponse {
        id,
        name,
        balance: Decimal::new(balance_minor, MINOR_SCALE),
        created_at,
        updated_at,
    })
}
