pub mod api;
pub mod config;
pub mod error;
pub mod extensions;
pub mod menu;
pub mod sanitize;
pub mod settings;
pub mod ui;

pub use error::{Error, Result};
