//! jobflow turns a free-text job query into scraped, enriched job listings.
//!
//! A [`WorkflowEngine`](orchestrator::WorkflowEngine) drives each query
//! through interpretation, scraping (with CAPTCHA handling), enrichment and
//! aggregation, calling remote sub-services found in a
//! [`ServerRegistry`](registry::ServerRegistry).

pub mod aggregate;
pub mod captcha;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod interpreter;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod rpc;
pub mod state_machine;

#[cfg(test)]
mod testing;

pub use config::JobflowConfig;
pub use error::JobflowError;
pub use model::JobQuery;
pub use orchestrator::WorkflowEngine;
