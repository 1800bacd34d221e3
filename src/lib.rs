//! letterflow: approval lifecycle for institutional letters.

pub mod api;
pub mod config;
pub mod error;
pub mod letters;
pub mod notify;
pub mod store;
