pub mod amount;
pub mod error;
pub mod message;
pub mod reconcile;
pub mod store;
pub mod streamer;
pub mod transfer;
