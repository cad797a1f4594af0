//! Client for the cloud monitoring API.
//!
//! - [`Connection`]: lazily authenticated, one token per connection
//! - [`paginate`]: marker-based listings as lazy streams
//! - [`MonitoringClient`]: entities, checks, alarms, notifications and
//!   notification plans
//! - [`ReqwestTransport`]: the production HTTP transport
//!
//! ```no_run
//! use cloudmon_client::MonitoringClient;
//! use futures::TryStreamExt;
//!
//! # async fn run(config: cloudmon_config::CloudmonConfig) -> cloudmon_core::Result<()> {
//! let client = MonitoringClient::from_config(&config)?;
//! let entities: Vec<_> = client.entities().try_collect().await?;
//! println!("{} entities", entities.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod pagination;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{MonitoringClient, ResourceStream};
pub use connection::{ApiResponse, Connection, ConnectionBuilder, ResponseBody, Session};
pub use pagination::{fetch_page, paginate, ListRequest, Page, PageMapper};
pub use transport::ReqwestTransport;
