use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::account::{Account, AccountStatus, Role};
use crate::models::capability::CapabilitySet;
use crate::models::token::{Lifespan, Token, TokenType};
use crate::store::{AccountView, FindOrCreate, TokenQuery, TokenStore};

const TOKEN_COLUMNS: &str = "id, token, account_id, token_type, purpose, initiator, inquirer, \
     description, permissions, lifespan_secs, issued_at, expires_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

async fn insert_token<'e, E>(executor: E, token: &Token) -> anyhow::Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"INSERT INTO tokens (id, token, account_id, token_type, purpose, initiator, inquirer,
                               description, permissions, lifespan_secs, issued_at, expires_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
    )
    .bind(token.id)
    .bind(&token.token)
    .bind(&token.account_id)
    .bind(token.token_type.as_str())
    .bind(&token.purpose)
    .bind(&token.initiator)
    .bind(&token.inquirer)
    .bind(&token.description)
    .bind(token.permissions.to_vec())
    .bind(token.lifespan.as_secs())
    .bind(token.issued_at)
    .bind(token.expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl TokenStore for PgStore {
    async fn find(&self, query: &TokenQuery) -> anyhow::Result<Vec<Token>> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens
             WHERE (expires_at IS NULL OR expires_at > NOW())
               AND ($1::TEXT IS NULL OR token = $1)
               AND ($2::TEXT IS NULL OR account_id = $2)
             ORDER BY issued_at DESC"
        ))
        .bind(&query.token)
        .bind(&query.account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Token::try_from).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens
             WHERE id = $1 AND (expires_at IS NULL OR expires_at > NOW())"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Token::try_from).transpose()
    }

    async fn find_by_value(&self, value: &str) -> anyhow::Result<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens
             WHERE token = $1 AND (expires_at IS NULL OR expires_at > NOW())"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Token::try_from).transpose()
    }

    async fn insert(&self, token: &Token) -> anyhow::Result<()> {
        insert_token(&self.pool, token).await
    }

    async fn find_or_create(&self, candidate: Token) -> anyhow::Result<FindOrCreate> {
        let fp = candidate.fingerprint();
        let mut tx = self.pool.begin().await?;

        // Serializes issuance per fingerprint; released on commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(fp.lock_key())
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens
             WHERE account_id = $1 AND purpose = $2 AND inquirer = $3
               AND (expires_at IS NULL OR expires_at > NOW())
             ORDER BY issued_at DESC
             LIMIT 1"
        ))
        .bind(&fp.account_id)
        .bind(&fp.purpose)
        .bind(&fp.inquirer)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            tx.commit().await?;
            return Ok(FindOrCreate::Existing(Token::try_from(row)?));
        }

        insert_token(&mut *tx, &candidate).await?;
        tx.commit().await?;
        Ok(FindOrCreate::Created(candidate))
    }

    async fn extend_expiry(&self, value: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "UPDATE tokens
             SET expires_at = CASE
                 WHEN expires_at IS NULL OR lifespan_secs IS NULL THEN expires_at
                 ELSE GREATEST(expires_at, $2 + lifespan_secs * INTERVAL '1 second')
             END
             WHERE token = $1 AND (expires_at IS NULL OR expires_at > $2)
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(value)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Token::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_account(&self, account_id: &str) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at IS NOT NULL AND expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AccountView for PgStore {
    async fn find_account(&self, id: &str) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, username, firstname, lastname, role, status, tenant, permissions FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Account::from))
    }
}

// -- Output structs --

#[derive(Debug, sqlx::FromRow)]
pub struct TokenRow {
    pub id: Uuid,
    pub token: String,
    pub account_id: String,
    pub token_type: String,
    pub purpose: String,
    pub initiator: String,
    pub inquirer: String,
    pub description: String,
    pub permissions: Vec<String>,
    /// NULL = never expires.
    pub lifespan_secs: Option<i64>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<TokenRow> for Token {
    type Error = anyhow::Error;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let lifespan = match row.lifespan_secs {
            None => Lifespan::Infinite,
            Some(secs) => Lifespan::try_from(secs).map_err(anyhow::Error::msg)?,
        };
        let token_type = TokenType::parse(&row.token_type)
            .ok_or_else(|| anyhow::anyhow!("token {} has unknown type '{}'", row.id, row.token_type))?;

        Ok(Token {
            id: row.id,
            token: row.token,
            account_id: row.account_id,
            token_type,
            purpose: row.purpose,
            initiator: row.initiator,
            inquirer: row.inquirer,
            description: row.description,
            permissions: CapabilitySet::from(row.permissions),
            lifespan,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AccountRow {
    pub id: String,
    pub username: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: String,
    pub status: String,
    pub tenant: Option<String>,
    pub permissions: Vec<String>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            username: row.username,
            firstname: row.firstname,
            lastname: row.lastname,
            role: Role::parse(&row.role),
            status: AccountStatus::parse(&row.status),
            tenant: row.tenant,
            permissions: CapabilitySet::from(row.permissions),
        }
    }
}
