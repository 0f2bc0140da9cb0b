//! Binary-side wiring: configuration, stores, command handlers and the
//! progress spinner.

pub(crate) mod app_config;
pub(crate) mod commands;
pub(crate) mod context;
pub(crate) mod progress_manager;
pub(crate) mod terminal;
