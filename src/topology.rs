// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Publish Topology
//!
//! This module derives the names of every broker object a publish actor
//! relies on and declares them. The names are a pure function of the actor
//! configuration and the actor's logical name:
//!
//! - primary exchange: `<exchange>`
//! - dead-letter exchange: `<exchange>_SIDELINE`
//! - queue: `<prefix>.<name>`
//! - dead-letter queue: `<queue>_SIDELINE`
//! - TTL mode only: `<exchange>_TTL` and `<queue>_TTL`
//!
//! Provisioning declares exchanges before the queues bound to them, and the
//! dead-letter exchange before the primary queue that references it. Every
//! declaration is idempotent; a declaration that conflicts with an existing
//! object aborts provisioning.

use crate::{
    channel::ConnectionProvider,
    config::ActorConfig,
    delay::DelayStrategy,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::QueueDefinition,
};
use tracing::{debug, error};

/// Suffix of the dead-letter exchange and queue
pub const SIDELINE_SUFFIX: &str = "_SIDELINE";

/// Queue name of the actor `name` under `prefix`.
pub fn queue_name(prefix: &str, name: &str) -> String {
    format!("{prefix}.{name}")
}

/// Every broker object name a publish actor uses, plus its delay strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorTopology {
    pub exchange: String,
    pub dead_letter_exchange: String,
    pub queue: String,
    pub dead_letter_queue: String,
    pub delay: DelayStrategy,
}

impl ActorTopology {
    /// Derives every exchange and queue name for an actor.
    ///
    /// # Parameters
    /// * `config` - Exchange, prefix and delay settings
    /// * `name` - Logical actor name
    ///
    /// # Returns
    /// The names plus the selected delay strategy; no broker call is made
    pub fn derive(config: &ActorConfig, name: &str) -> ActorTopology {
        let queue = queue_name(&config.prefix, name);

        ActorTopology {
            exchange: config.exchange.clone(),
            dead_letter_exchange: format!("{}{SIDELINE_SUFFIX}", config.exchange),
            dead_letter_queue: format!("{queue}{SIDELINE_SUFFIX}"),
            delay: DelayStrategy::select(config, &config.exchange, &queue),
            queue,
        }
    }

    /// Exchanges in declaration order: primary, dead-letter, then delay exchanges.
    pub fn exchanges(&self) -> Vec<ExchangeDefinition> {
        let mut exchanges = vec![
            self.delay.primary_exchange(&self.exchange),
            ExchangeDefinition::replicated_direct(&self.dead_letter_exchange),
        ];
        exchanges.extend(self.delay.delay_exchanges());
        exchanges
    }

    /// Queues in declaration order: dead-letter, primary, then delay queues.
    ///
    /// The dead-letter queue is bound with the primary queue name, which is
    /// the routing key dead-lettered messages keep.
    pub fn queues(&self, connection: &dyn ConnectionProvider) -> Vec<QueueDefinition> {
        let mut queues = vec![
            QueueDefinition::new(&self.dead_letter_queue)
                .exchange(&self.dead_letter_exchange)
                .routing_key(&self.queue),
            QueueDefinition::new(&self.queue)
                .exchange(&self.exchange)
                .args(connection.rmq_opts(&self.dead_letter_exchange)),
        ];
        queues.extend(
            self.delay
                .delay_queues(connection, &self.exchange, &self.queue),
        );
        queues
    }
}

/// Declares the topology of one publish actor.
pub struct Provisioner<'p> {
    connection: &'p dyn ConnectionProvider,
    topology: &'p ActorTopology,
}

impl<'p> Provisioner<'p> {
    pub fn new(connection: &'p dyn ConnectionProvider, topology: &'p ActorTopology) -> Self {
        Provisioner {
            connection,
            topology,
        }
    }

    /// Declares all exchanges, then all queues with their bindings.
    ///
    /// Stops at the first failure; nothing is retried.
    pub async fn install(&self) -> Result<(), AmqpError> {
        self.install_exchanges().await?;
        self.install_queues().await
    }

    async fn install_exchanges(&self) -> Result<(), AmqpError> {
        let channel = self.connection.channel().await?;

        for exch in self.topology.exchanges() {
            if let Err(err) = channel.declare_exchange(&exch).await {
                error!(
                    error = err.to_string(),
                    exchange = exch.name(),
                    queue = self.topology.queue.as_str(),
                    "failure to provision exchange"
                );
                return Err(err);
            }
        }

        Ok(())
    }

    async fn install_queues(&self) -> Result<(), AmqpError> {
        for def in self.topology.queues(self.connection) {
            if let Err(err) = self.connection.ensure(&def).await {
                error!(
                    error = err.to_string(),
                    queue = def.name(),
                    exchange = def.bound_exchange(),
                    "failure to provision queue"
                );
                return Err(err);
            }

            debug!("queue: {} bound to {}", def.name(), def.bound_exchange());
        }

        Ok(())
    }
}
