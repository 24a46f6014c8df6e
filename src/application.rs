//! Application layer - the collection run and what is built from it
//!
//! `collector` drives fetchers, parser and cache for every commodity;
//! `report` turns the quotes into the summary text; `scheduler` fires the
//! daily run.

pub mod collector;
pub mod report;
pub mod scheduler;

pub use collector::{CollectionRun, Collector, CollectorSettings};
pub use report::{build_summary, build_summary_now, format_brl};
pub use scheduler::{next_run, run_daily};
