//! # ML GAN
//!
//! Adversarial training of an image generator against a discriminator, driven
//! by a generic event-driven training loop on the Burn ML framework.
//!
//! ## Modules
//!
//! - [`engine`] — Epoch/batch loop, lifecycle events, triggers and handlers
//! - [`gan`] — Players, labels, per-player state and the alternating step
//! - [`networks`] — Feed-forward generator and discriminator
//! - [`data`] — Batch sources: in-memory images, synthetic blobs, MNIST
//! - [`training`] — Trainer wiring, loop observers, rolling metrics
//! - [`config`] — TOML configuration loading and validation
//! - [`error`] — Structured error types

#![recursion_limit = "256"]

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod gan;
pub mod networks;
pub mod training;
