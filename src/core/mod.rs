pub mod alerts;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod notify;
pub mod snapshot;
pub mod source;
