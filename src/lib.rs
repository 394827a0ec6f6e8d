//! Vehicle-Loan Filtering API Library
//!
//! This library provides the decision pipeline that screens vehicle-loan
//! applications (blacklist, customer category, credit bureau) and the scheme
//! matcher used at elaboration, together with their persistence and upstream
//! adapters and the HTTP handlers.
//!
//! # Modules
//!
//! - `api`: API-layer namespace.
//! - `core`: Decision logic namespace.
//! - `integrations`: External service namespace.
//! - `blacklist`: Dupcheck history classification and the blacklist matrix.
//! - `circuit_breaker`: Circuit breaker for upstream calls.
//! - `config`: Configuration management.
//! - `credit_bureau`: PBK evaluation rules.
//! - `customer_category`: Customer-domain segmentation.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Record store port and Postgres adapter.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `memory_store`: In-memory record store.
//! - `models`: Core data models.
//! - `pipeline`: Filtering orchestrator.
//! - `scheme`: Elaboration scheme matching.
//! - `services`: External service client port and reqwest adapter.
//! - `thresholds`: Fixed risk thresholds.
//! - `upstream_models`: Upstream payload shapes.

pub mod api;
pub mod core;
pub mod integrations;

pub mod blacklist;
pub mod circuit_breaker;
pub mod config;
pub mod credit_bureau;
pub mod customer_category;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod memory_store;
pub mod models;
pub mod pipeline;
pub mod scheme;
pub mod services;
pub mod thresholds;
pub mod upstream_models;
