//! Dermosul Core - Shared domain types.
//!
//! This crate provides the types shared by the Dermosul components:
//! - `api` - HTTP API for orders, payments, landing pages and the dashboard
//! - `cli` - Command-line tools for migrations and reconciliation
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. Database encoding is available behind the
//! `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, CPFs, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
