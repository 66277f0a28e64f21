//! The three extraction stages of a harvest.
//!
//! | Stage | Module | Input | Output |
//! |-------|--------|-------|--------|
//! | Resolve | [`search`] | search-results page | homepage URL |
//! | Mine | [`homepage`] | homepage markup | profile fields + article descriptors |
//! | Persist | [`article`] | one descriptor | `R/K/T/` on disk |
//!
//! Resolution and mining run once per keyword; persistence fans out over the
//! descriptors (see [`crate::pipeline`]).

pub mod article;
pub mod homepage;
pub mod search;
