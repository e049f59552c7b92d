//! Engine subsystems: the temporal submission and flexible-table data core.
//!
//! - [`periods`]: reporting-period timeline (open/close, sequential numbering)
//! - [`submissions`]: versioned draft/final program content per period
//! - [`history`]: per-field change timelines derived from submissions
//! - [`tables`]: schema-flexible tabular metric payloads

pub mod history;
pub mod periods;
pub mod submissions;
pub mod tables;
