pub mod admission;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod compactor;
pub mod config;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;
