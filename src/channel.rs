// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel and Connection Provider
//!
//! This module defines the two seams the publish actor talks to: `AmqpChannel`,
//! a channel able to declare exchanges, publish and close, and
//! `ConnectionProvider`, which hands out channels over a shared connection and
//! idempotently declares bound queues. `lapin` backs both in production through
//! `RabbitMQConnection`.

use crate::{
    config::ConnectionConfig, errors::AmqpError, exchange::ExchangeDefinition,
    queue::{dead_letter_args, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    protocol::{AMQPErrorKind, AMQPSoftError},
    types::{FieldTable, LongString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Reply code sent when a channel is closed on purpose
const AMQP_REPLY_SUCCESS: u16 = 200;

/// Whether the broker refused a declaration or binding because of the request
/// itself: an inequivalent re-declaration (`PRECONDITION_FAILED`) or a missing
/// exchange (`NOT_FOUND`). Anything else is a transport failure.
pub(crate) fn is_broker_rejection(err: &lapin::Error) -> bool {
    match err {
        lapin::Error::ProtocolError(amqp) => matches!(
            amqp.kind(),
            AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED)
                | AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND)
        ),
        _ => false,
    }
}

/// Maps a declaration failure onto its error class.
///
/// # Parameters
/// * `err` - The error returned by lapin
/// * `rejected` - Builds the configuration error used when the broker refused the request
///
/// # Returns
/// The configuration error for broker rejections, `ChannelError` otherwise
pub(crate) fn declaration_error(
    err: lapin::Error,
    rejected: impl FnOnce(String) -> AmqpError,
) -> AmqpError {
    if is_broker_rejection(&err) {
        rejected(err.to_string())
    } else {
        AmqpError::ChannelError(err.to_string())
    }
}

/// A broker channel, as used by the provisioner and the publish path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    /// Declares an exchange. Re-declaring an identical exchange is a no-op;
    /// a conflicting declaration fails.
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Writes one message. Does not wait for a broker confirmation.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError>;

    /// Closes the channel.
    async fn close(&self) -> Result<(), AmqpError>;
}

/// Supplies channels over a shared connection and declares bound queues.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Opens a new channel, owned by the caller.
    async fn new_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError>;

    /// Channel used for administrative (topology) operations.
    async fn channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError>;

    /// Declares the queue durable with its arguments and binds it to its exchange.
    async fn ensure(&self, queue: &QueueDefinition) -> Result<(), AmqpError>;

    /// Declaration arguments that dead-letter into `dead_letter_exchange`.
    fn rmq_opts(&self, dead_letter_exchange: &str) -> FieldTable {
        dead_letter_args(dead_letter_exchange)
    }
}

#[async_trait]
impl AmqpChannel for Channel {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", def.name());

        match self
            .exchange_declare(
                def.name(),
                def.kind().into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: def.is_durable(),
                    auto_delete: def.is_auto_delete(),
                    internal: false,
                    nowait: false,
                },
                def.arguments(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name(),
                    "error to declare the exchange"
                );
                Err(declaration_error(err, |reason| {
                    AmqpError::DeclareExchangeError(def.name().to_owned(), reason)
                }))
            }
            _ => {
                debug!("exchange: {} was created", def.name());
                Ok(())
            }
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        match self
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                payload,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    exchange, routing_key, "error publishing message"
                );
                Err(AmqpError::PublishingError(err.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        Channel::close(self, AMQP_REPLY_SUCCESS, "OK")
            .await
            .map_err(|err| AmqpError::ChannelCloseError(err.to_string()))
    }
}

/// `lapin` backed connection provider.
///
/// Owns the network connection and one administrative channel; publish
/// channels handed out by `new_channel` belong to their callers.
pub struct RabbitMQConnection {
    conn: Arc<Connection>,
    admin: Arc<Channel>,
}

impl RabbitMQConnection {
    /// Connects to RabbitMQ and opens the administrative channel.
    ///
    /// # Example
    /// ```no_run
    /// # async fn run() -> Result<(), publish_actor::errors::AmqpError> {
    /// use publish_actor::{channel::RabbitMQConnection, config::ConnectionConfig};
    ///
    /// let connection = RabbitMQConnection::connect(&ConnectionConfig::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(cfg: &ConnectionConfig) -> Result<Arc<RabbitMQConnection>, AmqpError> {
        let (conn, admin) = new_amqp_channel(cfg).await?;
        Ok(Arc::new(RabbitMQConnection { conn, admin }))
    }

    /// Returns the underlying lapin connection.
    ///
    /// # Returns
    /// The shared connection, e.g. to open channels outside the actor
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }
}

#[async_trait]
impl ConnectionProvider for RabbitMQConnection {
    async fn new_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        debug!("creating publish channel...");
        match self.conn.create_channel().await {
            Ok(c) => {
                debug!("channel created");
                Ok(Arc::new(c))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }
    }

    async fn channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        Ok(self.admin.clone())
    }

    async fn ensure(&self, queue: &QueueDefinition) -> Result<(), AmqpError> {
        debug!("creating queue: {}", queue.name());

        if let Err(err) = self
            .admin
            .queue_declare(
                queue.name(),
                QueueDeclareOptions {
                    passive: false,
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    nowait: false,
                },
                queue.arguments(),
            )
            .await
        {
            error!(
                error = err.to_string(),
                name = queue.name(),
                "error to declare the queue"
            );
            return Err(declaration_error(err, |reason| {
                AmqpError::DeclareQueueError(queue.name().to_owned(), reason)
            }));
        }

        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            queue.name(),
            queue.bound_exchange(),
            queue.binding_key()
        );

        match self
            .admin
            .queue_bind(
                queue.name(),
                queue.bound_exchange(),
                queue.binding_key(),
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(declaration_error(err, |_| {
                    AmqpError::BindingExchangeToQueueError(
                        queue.bound_exchange().to_owned(),
                        queue.name().to_owned(),
                    )
                }))
            }
            _ => Ok(()),
        }
    }
}

/// Creates a new AMQP connection and a channel on it.
///
/// The configured application name becomes the connection name shown in the
/// broker's management UI.
pub async fn new_amqp_channel(
    cfg: &ConnectionConfig,
) -> Result<(Arc<Connection>, Arc<Channel>), AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.app_name.clone()));

    let conn = match Connection::connect(&cfg.uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), host = %cfg.host, "failure to connect");
            Err(AmqpError::ConnectionError)
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((Arc::new(conn), Arc::new(c)))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError(err.to_string()))
        }
    }
}
