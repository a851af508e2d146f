//! Protocol module for mysqlproxy
//!
//! This module contains the MySQL wire protocol pieces the proxy needs to
//! intercept a session: greeting and auth response rewriting, plus query
//! observation.

pub mod mysql;
