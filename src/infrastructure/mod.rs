// Copyright 2025 Cowboy AI, LLC.

//! Infrastructure layer for cim-metadata
//!
//! Connection management for the NATS-backed metadata store.

pub mod nats_client;

pub use nats_client::{NatsClient, NatsConfig, NatsError};
