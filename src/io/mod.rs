//! Chain export. Enable via the `csv` feature.

#[cfg(feature = "csv")]
pub mod csv;
