//! Public contact form and CRM proxy endpoints

pub mod client;
pub mod handlers;
pub mod routes;

pub use client::{ContactProperties, CrmClient, CrmError, HubSpotClient, TokenGrant};
pub use handlers::ContactState;
pub use routes::create_contact_routes;
