//! Read-through cache and paced backfill for the Astronomy Picture of the Day.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod upstream;

pub use app::App;
pub use config::Config;
pub use error::{AppError, Result};
