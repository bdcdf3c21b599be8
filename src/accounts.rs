use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Nullable, Text, Timestamptz};
use serde::Serialize;

/// A person who may eventually pay. Created on the first lead capture for an
/// email address and only ever moved from unpaid to paid by the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, QueryableByName)]
pub struct Account {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Text)]
    pub email: String,
    #[diesel(sql_type = Bool)]
    pub has_paid: bool,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub paid_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Text>)]
    pub stripe_customer_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub stripe_latest_session_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub stripe_latest_payment_intent_id: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether a paid checkout with this session id was already applied
    pub fn has_recorded_session(&self, session_id: &str) -> bool {
        self.has_paid && self.stripe_latest_session_id.as_deref() == Some(session_id)
    }
}

/// Provider identifiers stored when a checkout is paid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub session_id: String,
    pub customer_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub paid_at: DateTime<Utc>,
}
