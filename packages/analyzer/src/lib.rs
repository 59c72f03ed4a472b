//! Command-line front end for danci-bkt: loads progress exports, fits BKT
//! parameters per grammar point and word, writes the analysis reports and
//! generates synthetic test data.

pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod report;

pub use error::{AnalyzerError, Result};
