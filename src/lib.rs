//! Live driver location sharing for a trucking fleet.
//!
//! Drivers publish their position into the drivers table
//! ([`tracking::publisher::LocationPublisher`]); admins keep a roster of
//! every driver in step with that table through its change feed
//! ([`roster::subscriber::PresenceSubscriber`]). [`app::App`] switches
//! between the two as sessions come and go.

#[macro_use] extern crate log;

pub mod app;
pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod model;
pub mod roster;
pub mod session;
pub mod tracking;

pub use config::Config;
pub use error::{ Error, Result };
