//! Worker thread owning the tokio runtime and the messenger client.

pub mod commands;
pub mod runtime;
