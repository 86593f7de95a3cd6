pub mod analytics;
pub mod api;
pub mod auth;
pub mod config;
pub mod contact;
pub mod cursor;
pub mod error;
pub mod models;
pub mod site;
pub mod storage;
