//! Domain services used by the websocket route.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so the route
//! handler stays focused on protocol translation and session plumbing.

pub mod ordering;
pub mod persistence;
