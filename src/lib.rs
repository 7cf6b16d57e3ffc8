//! This crate provides a query service for reservoir stored energy (EAR, "energia armazenada")
//! open data. The national grid operator publishes EAR time series on a CKAN open data portal as
//! one Parquet file per year. The service resolves a dataset identifier to those files, reads the
//! years a query needs, filters the rows by date and reservoir name, and returns them a page at a
//! time as JSON.
//!
//! A second, much thinner set of endpoints reads and appends rows of a BigQuery table.
//!
//! The service is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [Arrow](arrow) and [Parquet](parquet) hold and decode the tabular data. Remote files are
//!   read in place through the [object_store] HTTP backend where the server allows it.
//! * [reqwest] talks to the portal and the warehouse.

pub mod app;
pub mod app_state;
pub mod cli;
pub mod columnar_reader;
pub mod error;
pub mod filter;
pub mod frame;
pub mod locator;
pub mod metadata_cache;
pub mod metrics;
pub mod models;
pub mod portal;
pub mod query_engine;
pub mod retry;
pub mod sanitize;
pub mod server;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod validated;
pub mod warehouse;
