//! Request Tracker integration.
//!
//! This module provides:
//! - `router`: recipient address → (queue, action) resolution
//! - `client`: the [`Ticketing`] contract and the RT mail-gateway client
//! - `delivery`: per-message fan-out over recipients with outcome aggregation

pub mod client;
pub mod delivery;
pub mod router;

pub use client::{PostmailError, RtClient, Ticketing};
pub use delivery::{deliver_all, DeliveryOutcome};
pub use router::{Action, AddressQueueTable, AddressRouter, RouteResult};
