//! `adminpanel-core`: domain model for the user administration panel.
//!
//! This crate contains **pure** types (no IO, no HTTP). The client crate
//! builds the credential lifecycle and the directory controller on top.

pub mod error;
pub mod id;
pub mod role;
pub mod user;

pub use error::{AdminError, AdminResult};
pub use id::UserId;
pub use role::{Role, UnknownRole};
pub use user::{RoleChangeRequest, User, dedupe_by_id};
