//! `adminpanel-client`
//!
//! **Responsibility:** session-token lifecycle and the role-gated user
//! directory of the admin panel.
//!
//! This crate provides:
//! - A credential store holding the single bearer token (in memory or on disk)
//! - An authenticated HTTP client that classifies backend answers
//! - The directory controller (cached user list, optimistic role changes)
//!
//! Rendering and navigation stay with the caller; the controller only signals
//! when a fresh login is required.

pub mod config;
pub mod controller;
pub mod credential;
pub mod http;
pub mod session;

pub use adminpanel_core::{AdminError, AdminResult, Role, User, UserId};
pub use config::ClientConfig;
pub use controller::{DirectoryController, Phase, RoleChangeOutcome, SessionEvent};
pub use credential::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use http::{AuthenticatedClient, Method, Transport};
pub use session::{AdminSession, Directory};
