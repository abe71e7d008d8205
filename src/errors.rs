// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Publish Actor
//!
//! This module provides the error type shared by topology provisioning, the
//! connection provider and the publish path. The `AmqpError` enum groups the
//! failures into configuration errors (fatal at start), serialization errors
//! (fail one publish before anything is sent), transport errors (channel or
//! connection failures) and lifecycle misuse.

use thiserror::Error;

/// Represents errors that can occur while provisioning or publishing.
///
/// None of these are retried by this crate; every variant is surfaced to the
/// immediate caller.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// The actor configuration is not coherent (e.g. delayed without a delay type)
    #[error("invalid actor configuration: {0}")]
    InvalidConfig(String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating or using a channel
    #[error("channel failure: {0}")]
    ChannelError(String),

    /// Error declaring an exchange, including conflicting re-declarations
    #[error("failure to declare exchange `{0}`: {1}")]
    DeclareExchangeError(String, String),

    /// Error declaring a queue, including conflicting re-declarations
    #[error("failure to declare queue `{0}`: {1}")]
    DeclareQueueError(String, String),

    /// Error binding a queue to an exchange
    #[error("failure to bind exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// The message payload could not be encoded
    #[error("failure to serialize payload: {0}")]
    SerializationError(String),

    /// Error writing a message to the channel
    #[error("failure to publish: {0}")]
    PublishingError(String),

    /// Error closing the publish channel
    #[error("failure to close channel: {0}")]
    ChannelCloseError(String),

    /// The actor was used before `start()` succeeded or after `stop()`
    #[error("publish actor is not started")]
    NotStarted,

    /// `start()` was called on an actor that is already running
    #[error("publish actor is already started")]
    AlreadyStarted,
}

impl AmqpError {
    /// Whether this error belongs to the configuration class, which must abort startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AmqpError::InvalidConfig(_)
                | AmqpError::DeclareExchangeError(..)
                | AmqpError::DeclareQueueError(..)
                | AmqpError::BindingExchangeToQueueError(..)
        )
    }
}
