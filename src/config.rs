// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Actor and Connection Configuration
//!
//! Static configuration for a publish actor (exchange, queue prefix, delay mode)
//! and for the broker connection. Both are plain `serde` types so they can be
//! loaded from whatever source the application uses.

use crate::errors::AmqpError;
use serde::{Deserialize, Serialize};

/// How delayed delivery is realized on the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DelayType {
    /// No delay mechanism is provisioned.
    #[default]
    None,
    /// Emulated delay: a TTL queue dead-letters expired messages into the primary exchange.
    Ttl,
    /// The broker's `x-delayed-message` exchange plugin holds the message.
    #[serde(alias = "DELAYED")]
    Native,
}

/// Configuration of a single publish actor.
///
/// Immutable once the actor starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorConfig {
    pub exchange: String,
    pub prefix: String,
    #[serde(default)]
    pub delayed: bool,
    #[serde(default)]
    pub delay_type: DelayType,
}

impl ActorConfig {
    /// Creates a configuration for an actor without delayed delivery.
    ///
    /// # Parameters
    /// * `exchange` - Name of the primary exchange
    /// * `prefix` - Queue name prefix, joined to the actor name with a dot
    ///
    /// # Returns
    /// A config with `delayed` unset and `DelayType::None`
    pub fn new(exchange: &str, prefix: &str) -> ActorConfig {
        ActorConfig {
            exchange: exchange.to_owned(),
            prefix: prefix.to_owned(),
            delayed: false,
            delay_type: DelayType::None,
        }
    }

    /// Enables delayed delivery through the given mechanism.
    pub fn delayed(mut self, delay_type: DelayType) -> Self {
        self.delayed = true;
        self.delay_type = delay_type;
        self
    }

    /// Checks the invariants the provisioner relies on.
    pub fn validate(&self) -> Result<(), AmqpError> {
        if self.exchange.is_empty() {
            return Err(AmqpError::InvalidConfig("exchange name is empty".to_owned()));
        }

        if self.prefix.is_empty() {
            return Err(AmqpError::InvalidConfig("queue prefix is empty".to_owned()));
        }

        if self.delayed && self.delay_type == DelayType::None {
            return Err(AmqpError::InvalidConfig(format!(
                "exchange `{}` is delayed but no delay type is configured",
                self.exchange
            )));
        }

        Ok(())
    }
}

/// RabbitMQ connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub app_name: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: String::new(),
            app_name: "publish-actor".to_owned(),
        }
    }
}

impl ConnectionConfig {
    /// AMQP URI for this configuration. An empty vhost selects the broker default.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.vhost
        )
    }
}
