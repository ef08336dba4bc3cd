//! Reset scripts: template resolution and bounded dispatch.

pub mod script;
pub mod template;
