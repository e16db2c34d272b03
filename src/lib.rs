//! # tumor-scan
//!
//! A web backend that classifies grayscale brain scans for tumors with a
//! pre-trained CNN and keeps each user's prediction history in a document
//! store, plus the offline tooling that trains and scores the network.
//!
//! ## Request flow
//!
//! ```text
//!   HTTP request
//!        │
//!        ▼
//!   ┌──────────┐   bearer JWT
//!   │ AuthUser │──────────────▶ 401
//!   └────┬─────┘
//!        ▼
//!   ┌──────────────┐    QueryBuilder     ┌─────────────────┐
//!   │   handler    │───────────────────▶│ DatabaseService │──▶ Cosmos DB / memory
//!   └────┬─────────┘                     └─────────────────┘
//!        │ spawn_blocking
//!        ▼
//!   ┌───────────────────────────────┐
//!   │ temp file → grayscale → 128²  │
//!   │ → [0,1] → CNN → p > 0.5       │
//!   └───────────────────────────────┘
//!        │
//!        ▼
//!   format_object(s) → JSON response
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, store and auth
//! - [`models`] - Prediction batch documents returned by the API
//! - [`auth`] - Bearer-token verification and the `AuthUser` extractor
//! - [`db::query`] - `SELECT … FROM c WHERE …` builder
//! - [`db::format`] - Strips store bookkeeping fields from documents
//! - [`db::service`] - Container-scoped store facade that logs and swallows errors
//! - [`db::cosmos`] - Cosmos DB REST client with master-key signing
//! - [`db::memory`] - In-process store for local runs and tests
//! - [`classifier`] - Preprocessing, the burn CNN, training and evaluation
//! - [`api`] - Axum handlers for model info, predict and prediction history
//! - [`state`] - Shared application state holding the classifier and store

pub mod api;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod db;
pub mod models;
pub mod state;
