// db/paymentdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::paymentmodel::*;

const ACCOUNT_COLUMNS: &str = "id, user_id, bank_code, bank_name, account_number, account_name, \
    is_default, created_at";

#[async_trait]
pub trait PaymentAccountExt {
    /// Adds a payout account. The first account of a user always becomes the
    /// default; `make_default` moves the default flag onto the new account.
    async fn add_payment_account(
        &self,
        account: NewPaymentAccount,
        make_default: bool,
    ) -> Result<PaymentAccount, Error>;

    /// Moves the default flag to `account_id`, clearing every other default
    /// of the user in the same unit. `None` when the account is not the user's.
    async fn set_default_payment_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<PaymentAccount>, Error>;

    async fn get_payment_account(&self, account_id: Uuid) -> Result<Option<PaymentAccount>, Error>;

    async fn get_default_payment_account(&self, user_id: Uuid) -> Result<Option<PaymentAccount>, Error>;

    async fn get_payment_accounts(&self, user_id: Uuid) -> Result<Vec<PaymentAccount>, Error>;
}

#[async_trait]
impl PaymentAccountExt for DBClient {
    async fn add_payment_account(
        &self,
        account: NewPaymentAccount,
        make_default: bool,
    ) -> Result<PaymentAccount, Error> {
        let mut tx = self.pool.begin().await?;

        // Serialize default-flag writers for this user.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(account.user_id)
            .execute(&mut *tx)
            .await?;

        let has_default: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM payment_accounts WHERE user_id = $1 AND is_default)",
        )
        .bind(account.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let is_default = make_default || !has_default;
        if is_default {
            sqlx::query("UPDATE payment_accounts SET is_default = FALSE WHERE user_id = $1 AND is_default")
                .bind(account.user_id)
                .execute(&mut *tx)
                .await?;
        }

        let created = sqlx::query_as::<_, PaymentAccount>(&format!(
            r#"
            INSERT INTO payment_accounts
            (user_id, bank_code, bank_name, account_number, account_name, is_default)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.user_id)
        .bind(account.bank_code)
        .bind(account.bank_name)
        .bind(account.account_number)
        .bind(account.account_name)
        .bind(is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn set_default_payment_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<PaymentAccount>, Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM payment_accounts WHERE id = $1 AND user_id = $2)",
        )
        .bind(account_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if !owned {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("UPDATE payment_accounts SET is_default = FALSE WHERE user_id = $1 AND id <> $2")
            .bind(user_id)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let account = sqlx::query_as::<_, PaymentAccount>(&format!(
            r#"
            UPDATE payment_accounts SET is_default = TRUE
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(account))
    }

    async fn get_payment_account(&self, account_id: Uuid) -> Result<Option<PaymentAccount>, Error> {
        sqlx::query_as::<_, PaymentAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM payment_accounts WHERE id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_default_payment_account(&self, user_id: Uuid) -> Result<Option<PaymentAccount>, Error> {
        sqlx::query_as::<_, PaymentAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM payment_accounts WHERE user_id = $1 AND is_default"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_payment_accounts(&self, user_id: Uuid) -> Result<Vec<PaymentAccount>, Error> {
        sqlx::query_as::<_, PaymentAccount>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS} FROM payment_accounts
            WHERE user_id = $1
            ORDER BY is_default DESC, created_at ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
