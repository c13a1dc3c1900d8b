//! Roadwatch - real-time risk monitoring for drivers following a pre-computed route.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod build_info;
pub mod config;

// ============================================================================
// Server & HTTP
// ============================================================================

pub mod api;
pub mod handlers;
pub mod server;

// ============================================================================
// Domain
// ============================================================================

pub mod geo;
pub mod risk;
pub mod scheduler;
pub mod session;

// ============================================================================
// Collaborators
// ============================================================================

pub mod inference;
pub mod weather;

#[cfg(test)]
pub(crate) mod testing;
