//! Routes student documents through librarian screening and final review.
//!
//! The shared submission set lives in a key/value [`db::Backend`] (files or
//! Postgres); [`workflow`] holds the stage rules and projections, and
//! [`routes`] exposes them over HTTP.

pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod prefs;
pub mod routes;
pub mod state;
pub mod storage;
pub mod store;
pub mod sync;
pub mod workflow;
