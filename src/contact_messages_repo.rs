use async_trait::async_trait;
use diesel::sql_types::{BigInt, Text};

use crate::contact_messages::{
    ContactMessage, ContactMessageChanges, ContactStats, ContactStatus, NewContactMessage,
};
use crate::gateway::{Gateway, GatewayError, Statement, UpdateBuilder};
use crate::pagination::PageRequest;

const MESSAGE_COLUMNS: &str =
    "id, full_name, email, subject, message, status, created_at, updated_at";

#[async_trait]
pub trait ContactMessageStore: Send + Sync {
    /// One page of messages, newest first, plus the total matching the filter
    async fn list(
        &self,
        status: Option<ContactStatus>,
        page: PageRequest,
    ) -> Result<(Vec<ContactMessage>, i64), GatewayError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ContactMessage>, GatewayError>;

    async fn create(&self, message: NewContactMessage) -> Result<i64, GatewayError>;

    /// Apply only the supplied fields; returns false when no row matched
    async fn update(
        &self,
        id: i64,
        changes: ContactMessageChanges,
    ) -> Result<bool, GatewayError>;

    async fn update_status(&self, id: i64, status: ContactStatus) -> Result<bool, GatewayError> {
        let changes = ContactMessageChanges {
            status: Some(status),
            ..Default::default()
        };
        self.update(id, changes).await
    }

    async fn delete(&self, id: i64) -> Result<bool, GatewayError>;

    async fn stats(&self) -> Result<ContactStats, GatewayError>;
}

#[derive(Clone)]
pub struct ContactMessagesRepository {
    gateway: Gateway,
}

impl ContactMessagesRepository {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ContactMessageStore for ContactMessagesRepository {
    async fn list(
        &self,
        status: Option<ContactStatus>,
        page: PageRequest,
    ) -> Result<(Vec<ContactMessage>, i64), GatewayError> {
        let per_page = page.per_page;
        let offset = page.offset();

        let (count, select) = match status {
            Some(status) => (
                Statement::new("SELECT COUNT(*) AS total FROM contact_messages WHERE status = $1")
                    .bind::<Text, _>(status.as_str()),
                Statement::new(format!(
                    "SELECT {} FROM contact_messages WHERE status = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                    MESSAGE_COLUMNS
                ))
                .bind::<Text, _>(status.as_str())
                .bind::<BigInt, _>(per_page)
                .bind::<BigInt, _>(offset),
            ),
            None => (
                Statement::new("SELECT COUNT(*) AS total FROM contact_messages"),
                Statement::new(format!(
                    "SELECT {} FROM contact_messages \
                     ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                    MESSAGE_COLUMNS
                ))
                .bind::<BigInt, _>(per_page)
                .bind::<BigInt, _>(offset),
            ),
        };

        let total = self.gateway.count(count).await?;
        let messages = self.gateway.fetch_all::<ContactMessage>(select).await?;

        Ok((messages, total))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ContactMessage>, GatewayError> {
        let statement = Statement::new(format!(
            "SELECT {} FROM contact_messages WHERE id = $1",
            MESSAGE_COLUMNS
        ))
        .bind::<BigInt, _>(id);

        self.gateway.fetch_one::<ContactMessage>(statement).await
    }

    async fn create(&self, message: NewContactMessage) -> Result<i64, GatewayError> {
        let statement = Statement::new(
            "INSERT INTO contact_messages (full_name, email, subject, message, status) \
             VALUES ($1, $2, $3, $4, 'new') RETURNING id",
        )
        .bind::<Text, _>(message.full_name)
        .bind::<Text, _>(message.email)
        .bind::<Text, _>(message.subject)
        .bind::<Text, _>(message.message);

        self.gateway.insert_returning_id(statement).await
    }

    async fn update(
        &self,
        id: i64,
        changes: ContactMessageChanges,
    ) -> Result<bool, GatewayError> {
        let statement = UpdateBuilder::new("contact_messages")
            .set_if_present::<Text, _>("full_name", changes.full_name)
            .set_if_present::<Text, _>("email", changes.email)
            .set_if_present::<Text, _>("subject", changes.subject)
            .set_if_present::<Text, _>("message", changes.message)
            .set_if_present::<Text, _>("status", changes.status.map(|s| s.as_str()))
            .set_expr("updated_at", "NOW()")
            .where_id(id);

        Ok(self.gateway.write(statement).await? > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool, GatewayError> {
        let statement =
            Statement::new("DELETE FROM contact_messages WHERE id = $1").bind::<BigInt, _>(id);
        Ok(self.gateway.write(statement).await? > 0)
    }

    async fn stats(&self) -> Result<ContactStats, GatewayError> {
        let statement = Statement::new(
            "SELECT COUNT(*) AS total_messages, \
             COUNT(*) FILTER (WHERE status = 'new') AS new_messages, \
             COUNT(*) FILTER (WHERE status = 'read') AS read_messages, \
             COUNT(*) FILTER (WHERE status = 'replied') AS replied_messages \
             FROM contact_messages",
        );

        Ok(self
            .gateway
            .fetch_one::<ContactStats>(statement)
            .await?
            .unwrap_or_default())
    }
}
