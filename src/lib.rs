pub mod client_ip;
pub mod config;
pub mod envelope;
pub mod forwarder;
pub mod server;
pub mod sources;
pub mod tapd;
