//! # web-relay-e2e-tests
//!
//! End-to-end tests for the web relay.
//!
//! Every scenario runs a real relay on a loopback port, with on-disk
//! storage in a temporary directory, and talks to it through real HTTP
//! clients:
//! - Publishing, reading and deleting entries across clients
//! - Sharing encrypted entries by URL
//! - Timestamp conflicts and rejected uploads
//! - Offline writes replayed after a restart
//! - Live updates over subscriptions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod harness;

pub mod scenarios;
