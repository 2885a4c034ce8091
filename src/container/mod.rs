//! Container module for per-session application sandboxes
//!
//! Containers are built from a session image, bound to a host port and
//! driven through their lifecycle:
//! - build and create (with port allocation and recovery labels)
//! - start, which reclaims the recorded port or reports a conflict
//! - stop and delete, which release the port reservation

mod manager;
mod types;

pub use manager::ContainerManager;
pub use types::{CreatedContainer, DeletedContainer, StartedContainer};
