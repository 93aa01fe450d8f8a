//! HTTP front end of the Porta identity provider

pub mod app;
pub mod handlers;
pub mod server;

pub use app::*;
pub use server::PortaServer;
