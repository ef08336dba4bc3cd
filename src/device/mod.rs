//! Device-facing helpers: details reporting and front-panel LEDs.

pub mod front_panel;
pub mod info;
