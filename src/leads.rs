use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Nullable, Text, Timestamptz};

pub const BEGIN_JOURNEY_SOURCE: &str = "begin_journey_modal";

/// Lead captured by the begin-journey form
#[derive(Debug, Clone, PartialEq, Eq, QueryableByName)]
pub struct SupportLead {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub account_id: Option<i64>,
    #[diesel(sql_type = Text)]
    pub first_name: String,
    #[diesel(sql_type = Text)]
    pub last_name: String,
    #[diesel(sql_type = Text)]
    pub email: String,
    #[diesel(sql_type = Text)]
    pub phone: String,
    #[diesel(sql_type = Text)]
    pub time_zone: String,
    #[diesel(sql_type = Bool)]
    pub consent_to_contact: bool,
    #[diesel(sql_type = Nullable<Text>)]
    pub offer_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub price_label: Option<String>,
    #[diesel(sql_type = Text)]
    pub source: String,
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub ip_address: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub user_agent: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub internal_notes: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSupportLead {
    pub account_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub time_zone: String,
    pub consent_to_contact: bool,
    pub offer_id: Option<String>,
    pub price_label: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
