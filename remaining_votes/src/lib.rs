//! Remaining daily votes on a Stack Exchange site.
//!
//! This library supports the remaining-votes binary found elsewhere in this
//! project. It scrapes the profile of the logged-in user to count the votes
//! cast today and compares them against the daily vote budget. Requests to the
//! votes tab are paced by a throttle shared with every other running instance.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod activity;
pub mod config;
pub mod endpoint;
pub mod fetcher;
pub mod marker;
pub mod report;
pub mod summary;
pub mod vote;

#[cfg(test)]
mod mock;
