use async_trait::async_trait;
use diesel::sql_types::{BigInt, Jsonb, Nullable, Text};

use crate::concierge::{CONCIERGE_SOURCE, ConciergeRequest, NewConciergeRequest};
use crate::gateway::{Gateway, GatewayError, Statement};

const CONCIERGE_COLUMNS: &str = "id, first_name, last_name, email, phone, location, \
     selected_services, special_requirements, notes, additional_context, source, status, \
     ip_address, user_agent, created_at";

#[async_trait]
pub trait ConciergeStore: Send + Sync {
    async fn create(&self, request: NewConciergeRequest) -> Result<ConciergeRequest, GatewayError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ConciergeRequest>, GatewayError>;

    async fn list(&self, limit: i64) -> Result<Vec<ConciergeRequest>, GatewayError>;
}

#[derive(Clone)]
pub struct ConciergeRepository {
    gateway: Gateway,
}

impl ConciergeRepository {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ConciergeStore for ConciergeRepository {
    async fn create(&self, request: NewConciergeRequest) -> Result<ConciergeRequest, GatewayError> {
        let services = serde_json::Value::from(request.selected_services);
        let statement = Statement::new(format!(
            "INSERT INTO concierge_requests (
                first_name, last_name, email, phone, location,
                selected_services, special_requirements, notes, additional_context,
                source, status, ip_address, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'new', $11, $12)
            RETURNING {}",
            CONCIERGE_COLUMNS
        ))
        .bind::<Text, _>(request.first_name)
        .bind::<Text, _>(request.last_name)
        .bind::<Text, _>(request.email)
        .bind::<Text, _>(request.phone)
        .bind::<Text, _>(request.location)
        .bind::<Jsonb, _>(services)
        .bind::<Text, _>(request.special_requirements)
        .bind::<Text, _>(request.notes)
        .bind::<Text, _>(request.additional_context)
        .bind::<Text, _>(CONCIERGE_SOURCE)
        .bind::<Nullable<Text>, _>(request.ip_address)
        .bind::<Nullable<Text>, _>(request.user_agent);

        self.gateway
            .fetch_one::<ConciergeRequest>(statement)
            .await?
            .ok_or_else(|| GatewayError::QueryFailed("concierge insert returned no row".into()))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ConciergeRequest>, GatewayError> {
        let statement = Statement::new(format!(
            "SELECT {} FROM concierge_requests WHERE id = $1",
            CONCIERGE_COLUMNS
        ))
        .bind::<BigInt, _>(id);

        self.gateway.fetch_one::<ConciergeRequest>(statement).await
    }

    async fn list(&self, limit: i64) -> Result<Vec<ConciergeRequest>, GatewayError> {
        let statement = Statement::new(format!(
            "SELECT {} FROM concierge_requests ORDER BY created_at DESC LIMIT $1",
            CONCIERGE_COLUMNS
        ))
        .bind::<BigInt, _>(limit);

        self.gateway.fetch_all::<ConciergeRequest>(statement).await
    }
}
