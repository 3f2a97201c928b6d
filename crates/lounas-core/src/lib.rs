//! Core domain + application logic for the lunch-menu bot.
//!
//! This crate is framework-agnostic. The chat transport lives behind
//! `messaging::port::MessagingPort` and is implemented in adapter crates.

pub mod blocks;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod cron;
pub mod domain;
pub mod errors;
pub mod html;
pub mod jobs;
pub mod logging;
pub mod menu;
pub mod messaging;
pub mod normalize;
pub mod router;
pub mod runtime;
pub mod service;
pub mod sources;
pub mod truncation;
pub mod votes;
pub mod weather;

pub use errors::{Error, Result};
