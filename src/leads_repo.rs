use async_trait::async_trait;
use diesel::sql_types::{BigInt, Bool, Nullable, Text};

use crate::gateway::{Gateway, GatewayError, Statement};
use crate::leads::{BEGIN_JOURNEY_SOURCE, NewSupportLead, SupportLead};

const LEAD_COLUMNS: &str = "id, account_id, first_name, last_name, email, phone, time_zone, \
     consent_to_contact, offer_id, price_label, source, status, ip_address, user_agent, \
     internal_notes, created_at";

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn create(&self, lead: NewSupportLead) -> Result<SupportLead, GatewayError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<SupportLead>, GatewayError>;

    /// Most recent leads first
    async fn list(&self, limit: i64) -> Result<Vec<SupportLead>, GatewayError>;
}

#[derive(Clone)]
pub struct LeadsRepository {
    gateway: Gateway,
}

impl LeadsRepository {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl LeadStore for LeadsRepository {
    async fn create(&self, lead: NewSupportLead) -> Result<SupportLead, GatewayError> {
        let statement = Statement::new(format!(
            "INSERT INTO support_leads (
                account_id, first_name, last_name, email, phone,
                time_zone, consent_to_contact, offer_id, price_label,
                source, status, ip_address, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'new', $11, $12)
            RETURNING {}",
            LEAD_COLUMNS
        ))
        .bind::<BigInt, _>(lead.account_id)
        .bind::<Text, _>(lead.first_name)
        .bind::<Text, _>(lead.last_name)
        .bind::<Text, _>(lead.email)
        .bind::<Text, _>(lead.phone)
        .bind::<Text, _>(lead.time_zone)
        .bind::<Bool, _>(lead.consent_to_contact)
        .bind::<Nullable<Text>, _>(lead.offer_id)
        .bind::<Nullable<Text>, _>(lead.price_label)
        .bind::<Text, _>(BEGIN_JOURNEY_SOURCE)
        .bind::<Nullable<Text>, _>(lead.ip_address)
        .bind::<Nullable<Text>, _>(lead.user_agent);

        self.gateway
            .fetch_one::<SupportLead>(statement)
            .await?
            .ok_or_else(|| GatewayError::QueryFailed("lead insert returned no row".into()))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<SupportLead>, GatewayError> {
        let statement = Statement::new(format!(
            "SELECT {} FROM support_leads WHERE id = $1",
            LEAD_COLUMNS
        ))
        .bind::<BigInt, _>(id);

        self.gateway.fetch_one::<SupportLead>(statement).await
    }

    async fn list(&self, limit: i64) -> Result<Vec<SupportLead>, GatewayError> {
        let statement = Statement::new(format!(
            "SELECT {} FROM support_leads ORDER BY created_at DESC LIMIT $1",
            LEAD_COLUMNS
        ))
        .bind::<BigInt, _>(limit);

        self.gateway.fetch_all::<SupportLead>(statement).await
    }
}
