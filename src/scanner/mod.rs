//! Clean-state audit: audit-list parsing, pattern expansion, and the scanner.

pub mod audit;
pub mod patterns;
