use async_trait::async_trait;
use diesel::sql_types::{BigInt, Text};

use crate::gateway::{Gateway, GatewayError, Statement};
use crate::newsletter::{LeadSource, NewNewsletterLead, NewsletterLead};
use crate::pagination::PageRequest;

const NEWSLETTER_COLUMNS: &str = "id, email, source, created_at";

#[async_trait]
pub trait NewsletterLeadStore: Send + Sync {
    async fn create(&self, lead: NewNewsletterLead) -> Result<i64, GatewayError>;

    /// One page of signups, newest first, plus the total matching the filter
    async fn list(
        &self,
        source: Option<LeadSource>,
        page: PageRequest,
    ) -> Result<(Vec<NewsletterLead>, i64), GatewayError>;
}

#[derive(Clone)]
pub struct NewsletterLeadsRepository {
    gateway: Gateway,
}

impl NewsletterLeadsRepository {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl NewsletterLeadStore for NewsletterLeadsRepository {
    async fn create(&self, lead: NewNewsletterLead) -> Result<i64, GatewayError> {
        let statement = Statement::new(
            "INSERT INTO newsletter_leads (email, source) VALUES ($1, $2) RETURNING id",
        )
        .bind::<Text, _>(lead.email)
        .bind::<Text, _>(lead.source.as_str());

        self.gateway.insert_returning_id(statement).await
    }

    async fn list(
        &self,
        source: Option<LeadSource>,
        page: PageRequest,
    ) -> Result<(Vec<NewsletterLead>, i64), GatewayError> {
        let (count, select) = match source {
            Some(source) => (
                Statement::new("SELECT COUNT(*) AS total FROM newsletter_leads WHERE source = $1")
                    .bind::<Text, _>(source.as_str()),
                Statement::new(format!(
                    "SELECT {} FROM newsletter_leads WHERE source = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                    NEWSLETTER_COLUMNS
                ))
                .bind::<Text, _>(source.as_str())
                .bind::<BigInt, _>(page.per_page)
                .bind::<BigInt, _>(page.offset()),
            ),
            None => (
                Statement::new("SELECT COUNT(*) AS total FROM newsletter_leads"),
                Statement::new(format!(
                    "SELECT {} FROM newsletter_leads \
                     ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                    NEWSLETTER_COLUMNS
                ))
                .bind::<BigInt, _>(page.per_page)
                .bind::<BigInt, _>(page.offset()),
            ),
        };

        let total = self.gateway.count(count).await?;
        let leads = self.gateway.fetch_all::<NewsletterLead>(select).await?;

        Ok((leads, total))
    }
}
