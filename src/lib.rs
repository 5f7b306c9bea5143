// Library surface for the binary, headless runs and integration tests.
pub mod activity;
pub mod app;
pub mod app_dirs;
pub mod command;
pub mod config;
pub mod content;
pub mod error;
pub mod location;
pub mod mediator;
pub mod observable;
pub mod progress;
pub mod runtime;
pub mod store;
pub mod timing;
pub mod ui;
pub mod util;
