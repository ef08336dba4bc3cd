//! Process lifecycle helpers for commands that stay resident.

pub mod signals;
