//! Complaint delay reporting.
//!
//! Loads a spreadsheet export of customer complaints, derives processing
//! delay, delay bucket, closure state and an early-warning alert per record,
//! then filters, aggregates and exports the result.
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod reports;
pub mod types;
pub mod util;
