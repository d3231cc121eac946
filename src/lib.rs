#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod auth;
pub mod backend;
pub mod config;
pub mod data;
pub mod engagement;
pub mod feed;
pub mod media;
pub mod session;
pub mod storage;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
