use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Jsonb, Nullable, Text, Timestamptz};

pub const CONCIERGE_SOURCE: &str = "concierge_pricing_page";

/// Concierge service request submitted from the pricing page
#[derive(Debug, Clone, PartialEq, QueryableByName)]
pub struct ConciergeRequest {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Text)]
    pub first_name: String,
    #[diesel(sql_type = Text)]
    pub last_name: String,
    #[diesel(sql_type = Text)]
    pub email: String,
    #[diesel(sql_type = Text)]
    pub phone: String,
    #[diesel(sql_type = Text)]
    pub location: String,
    #[diesel(sql_type = Jsonb)]
    pub selected_services: serde_json::Value,
    #[diesel(sql_type = Text)]
    pub special_requirements: String,
    #[diesel(sql_type = Text)]
    pub notes: String,
    #[diesel(sql_type = Text)]
    pub additional_context: String,
    #[diesel(sql_type = Text)]
    pub source: String,
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub ip_address: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub user_agent: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    pub created_at: DateTime<Utc>,
}

impl ConciergeRequest {
    /// Selected services as strings; anything that is not a string array reads as empty
    pub fn services(&self) -> Vec<String> {
        self.selected_services
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConciergeRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub selected_services: Vec<String>,
    pub special_requirements: String,
    pub notes: String,
    pub additional_context: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
