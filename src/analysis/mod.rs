//! Descriptive TTM statistics, summaries and period comparisons.

pub mod compare;
pub mod stats;
pub mod summary;
