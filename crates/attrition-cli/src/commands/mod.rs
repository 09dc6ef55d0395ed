//! Subcommand bodies. Each takes an initialised service and writes its
//! result as JSON (or a CSV/TSV table for batch predictions).
pub mod predict;
pub mod report;
