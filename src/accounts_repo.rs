use async_trait::async_trait;
use diesel::sql_types::{BigInt, Nullable, Text, Timestamptz};

use crate::accounts::{Account, PaymentRecord};
use crate::gateway::{Gateway, GatewayError, Statement};

const ACCOUNT_COLUMNS: &str = "id, email, has_paid, paid_at, stripe_customer_id, \
     stripe_latest_session_id, stripe_latest_payment_intent_id, created_at";

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Return the account for a normalized email, creating it if needed
    async fn find_or_create_by_email(&self, email: &str) -> Result<Account, GatewayError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Account>, GatewayError>;

    /// Apply the unpaid -> paid transition; returns false if no account matched
    async fn mark_paid(&self, id: i64, payment: &PaymentRecord) -> Result<bool, GatewayError>;
}

#[derive(Clone)]
pub struct AccountsRepository {
    gateway: Gateway,
}

impl AccountsRepository {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl AccountStore for AccountsRepository {
    async fn find_or_create_by_email(&self, email: &str) -> Result<Account, GatewayError> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let statement = Statement::new(format!(
            "INSERT INTO accounts (email) VALUES ($1) \
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
             RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind::<Text, _>(email.to_string());

        self.gateway
            .fetch_one::<Account>(statement)
            .await?
            .ok_or_else(|| GatewayError::QueryFailed("account upsert returned no row".into()))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Account>, GatewayError> {
        let statement = Statement::new(format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind::<BigInt, _>(id);

        self.gateway.fetch_one::<Account>(statement).await
    }

    async fn mark_paid(&self, id: i64, payment: &PaymentRecord) -> Result<bool, GatewayError> {
        let statement = Statement::new(
            "UPDATE accounts SET has_paid = TRUE, paid_at = $1, stripe_customer_id = $2, \
             stripe_latest_session_id = $3, stripe_latest_payment_intent_id = $4 \
             WHERE id = $5",
        )
        .bind::<Timestamptz, _>(payment.paid_at)
        .bind::<Nullable<Text>, _>(payment.customer_id.clone())
        .bind::<Text, _>(payment.session_id.clone())
        .bind::<Nullable<Text>, _>(payment.payment_intent_id.clone())
        .bind::<BigInt, _>(id);

        let updated = self.gateway.write(statement).await?;
        Ok(updated > 0)
    }
}
