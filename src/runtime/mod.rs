//! Container runtime client
//!
//! Thin command builders over the process executor plus the parsing
//! boundary that turns runtime JSON into typed records.

mod client;
mod inspect;
mod listing;

pub use client::RuntimeClient;
pub use inspect::{parse_inspect, ContainerState};
pub use listing::{parse_listing, ContainerSummary, PortMapping};
