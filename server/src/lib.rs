pub mod api;
pub mod config;
pub mod ledger;
pub mod persistence;
pub mod poller;
pub mod sui;
