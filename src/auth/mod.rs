//! # Authentication Module
//!
//! JWT issuance and verification, the request middleware that resolves a
//! bearer token into an identity, and the authorization checks handlers run
//! against that identity.

pub mod clock;
pub mod extract;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod policy;
