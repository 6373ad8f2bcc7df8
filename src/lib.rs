//! OCR Server Library
//!
//! Image text extraction behind a small authenticated REST API. The binary in
//! main.rs wires these modules together; integration tests build the router
//! from here.
//!
//! # Modules
//!
//! - `auth`: password hashing, session tokens, request extractor
//! - `db`: SQLite persistence for users and OCR results
//! - `storage`: S3-compatible and in-memory object stores
//! - `upload`: image upload validation
//! - `ocr`: recognition providers, engine pool and the processing service
//! - `routes`: axum HTTP surface

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ocr;
pub mod retry;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
