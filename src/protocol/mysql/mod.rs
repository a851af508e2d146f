//! MySQL protocol implementation
//!
//! This module contains:
//! - Packet layout constants and header helpers
//! - Authentication (mysql_native_password)
//! - In-flight packet mutators

pub mod auth;
pub mod packets;
pub mod rewrite;

pub use auth::*;
pub use packets::*;
pub use rewrite::*;
