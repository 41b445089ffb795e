//! Controller layer: UI events, reducer-like state transitions, and command orchestration.

pub mod events;
pub mod orchestration;
pub mod reducer;
pub mod scroll;
