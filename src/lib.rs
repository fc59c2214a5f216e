//! skulink - SKU-based image-to-product linking pipeline
//!
//! Scans an object storage bucket of product images, extracts SKU candidates
//! from file names, resolves them against the product catalog and persists
//! links and review candidates in batches, with pausable sessions.

// Module declarations
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod linking;
