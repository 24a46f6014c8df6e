//! Agro Price Digest - daily CEPEA/ESALQ commodity indicator digest
//!
//! Scrapes the Soja, Milho and Boi Gordo indicator pages, keeps only R$
//! prices, validates them per commodity, falls back to the last known good
//! values and hands a three-line summary to a delivery.

// Module declarations
pub mod application;
pub mod commands;
pub mod domain;
pub mod infrastructure;
