//! Backend for the advisory site: intake forms, one-time payment through
//! Stripe Checkout, and admin email notifications.

pub mod accounts;
pub mod accounts_repo;
pub mod actions;
pub mod concierge;
pub mod concierge_repo;
pub mod config;
pub mod contact_messages;
pub mod contact_messages_repo;
pub mod email;
pub mod gateway;
pub mod leads;
pub mod leads_repo;
pub mod metrics;
pub mod newsletter;
pub mod newsletter_repo;
pub mod notifications;
pub mod notifier;
pub mod pagination;
pub mod stripe_client;
pub mod stripe_webhooks;
pub mod validation;
pub mod web;

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
