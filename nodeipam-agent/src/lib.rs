pub mod backoff;
pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod helpers;
pub mod ipam;
pub mod lifecycle;
pub mod metrics;
pub mod reconciler;
pub mod status;

#[cfg(test)]
mod testing;
