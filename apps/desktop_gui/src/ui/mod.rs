//! UI layer for desktop GUI: app shell, widgets, and colors.

pub mod app;
pub mod theme;
pub mod widgets;

pub use app::{DesktopGuiApp, StartupConfig};
