//! Inspection Core Library
//!
//! Field-inspection workflow: dynamic forms, photo normalization, PDF
//! report export and record persistence. The server binary in main.rs
//! exposes it over HTTP.
//!
//! # Modules
//!
//! - `form`: schemas, validation, sessions, rendering, auto-save
//! - `photo`: image capture normalization
//! - `pdf`: AcroForm template filling and report hand-off
//! - `records`: inspection records and their stores
//! - `inspection`: the workflow service tying them together

pub mod config;
pub mod db;
pub mod error;
pub mod form;
pub mod inspection;
pub mod pdf;
pub mod photo;
pub mod records;
pub mod routes;
pub mod state;
