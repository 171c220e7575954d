//! Reporting helpers.
//!
//! Wraps plotting helpers (Plotly) and renders a standalone HTML page
//! summarising a trained model and its feature importances.
pub mod plots;
pub mod report;

pub use report::{render_importance_report, write_importance_report};
