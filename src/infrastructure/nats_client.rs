// Copyright 2025 Cowboy AI, LLC.

//! NATS connection for the durable metadata store

use crate::persistence::{JetStreamBucket, NatsKvConfig, NatsKvStore, StorageResult};
use async_nats::jetstream::{self, Context as JetStreamContext};
use async_nats::{Client, ConnectOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that can occur when connecting to NATS
#[derive(Debug, Error)]
pub enum NatsError {
    /// Failed to establish connection to NATS server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Configuration for the NATS connection and metadata bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL (e.g., "nats://localhost:4222")
    pub url: String,

    /// Optional username for authentication
    pub user: Option<String>,

    /// Optional password for authentication
    pub password: Option<String>,

    /// Whether TLS is required
    pub tls_required: bool,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Reconnect interval in seconds
    pub reconnect_interval_secs: u64,

    /// Maximum reconnect attempts (0 = infinite)
    pub max_reconnects: usize,

    /// Bucket metadata documents are stored in
    pub metadata_bucket: NatsKvConfig,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            user: None,
            password: None,
            tls_required: false,
            connection_timeout_secs: 10,
            reconnect_interval_secs: 5,
            max_reconnects: 0,
            metadata_bucket: NatsKvConfig::default(),
        }
    }
}

impl NatsConfig {
    fn validate(&self) -> Result<(), NatsError> {
        if self.url.is_empty() {
            return Err(NatsError::ConfigurationError("url is empty".to_string()));
        }
        if self.user.is_some() != self.password.is_some() {
            return Err(NatsError::ConfigurationError(
                "user and password must be set together".to_string(),
            ));
        }
        if self.metadata_bucket.bucket_name.is_empty() {
            return Err(NatsError::ConfigurationError(
                "metadata bucket name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// NATS client wrapper with JetStream support
#[derive(Debug)]
pub struct NatsClient {
    client: Client,
    jetstream: JetStreamContext,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS server with the provided configuration
    pub async fn connect(config: NatsConfig) -> Result<Self, NatsError> {
        config.validate()?;

        let reconnect_interval = Duration::from_secs(config.reconnect_interval_secs);
        let max_reconnects = config.max_reconnects;
        let mut options = ConnectOptions::new()
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .reconnect_delay_callback(move |attempts| {
                if max_reconnects > 0 && attempts >= max_reconnects {
                    Duration::from_secs(0)
                } else {
                    reconnect_interval
                }
            })
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => warn!("NATS disconnected"),
                    async_nats::Event::Connected => info!("NATS connected"),
                    async_nats::Event::ClientError(err) => error!("NATS client error: {err}"),
                    _ => {}
                }
            });

        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options = options.user_and_password(user.clone(), password.clone());
        }

        if config.tls_required {
            options = options.require_tls(true);
        }

        let client = options.connect(&config.url).await.map_err(|e| {
            NatsError::ConnectionFailed(format!("Failed to connect to {}: {}", config.url, e))
        })?;

        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Get the underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get the JetStream context
    pub fn jetstream(&self) -> &JetStreamContext {
        &self.jetstream
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Check if the client is connected
    pub async fn is_connected(&self) -> bool {
        self.client.flush().await.is_ok()
    }

    /// Metadata store over the configured bucket, creating it if needed
    pub async fn metadata_store<T>(&self) -> StorageResult<NatsKvStore<T>> {
        let bucket = JetStreamBucket::create(&self.jetstream, &self.config.metadata_bucket).await?;
        Ok(NatsKvStore::new(
            Arc::new(bucket),
            self.config.metadata_bucket.bucket_name.clone(),
        ))
    }
}
