//! Tollgate - token service for container registry bearer authentication
//!
//! Clients present HTTP basic credentials and a requested scope; a chain of
//! pluggable authorizers decides, and a signed JWT carrying the granted
//! `access` claim is returned. All modules are public for testing purposes.

pub mod authz;
pub mod claims;
pub mod errors;
pub mod issuer;
pub mod keys;
pub mod kid;
pub mod scope;
pub mod settings;
pub mod web;
