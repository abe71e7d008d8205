// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delayed Delivery Strategies
//!
//! A `DelayStrategy` is selected once from the actor configuration and owns
//! both halves of the delay mechanism: the broker objects it needs declared
//! and the route plus properties of a delayed publish.
//!
//! - `Immediate`: nothing extra is provisioned. A delayed publish still carries
//!   an `x-delay` header, which a plain direct exchange ignores.
//! - `Native`: the primary exchange is an `x-delayed-message` exchange and a
//!   delayed publish carries the `x-delay` header.
//! - `Ttl`: a `<exchange>_TTL` exchange feeds a `<queue>_TTL` queue which
//!   dead-letters expired messages back into the primary exchange. A delayed
//!   publish targets the TTL exchange with a per-message `expiration`.

use crate::{
    channel::ConnectionProvider,
    config::{ActorConfig, DelayType},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::QueueDefinition,
};
use lapin::{
    types::{AMQPValue, FieldTable, LongLongInt, ShortString},
    BasicProperties,
};

/// Header read by the delayed message exchange plugin
pub const AMQP_HEADERS_DELAY: &str = "x-delay";

/// Suffix of the exchange and queue used for TTL emulation
pub const TTL_SUFFIX: &str = "_TTL";

/// Delivery mode flagging a message as persisted to disk
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Names of the TTL exchange and queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlRoute {
    pub exchange: String,
    pub queue: String,
}

impl TtlRoute {
    /// Derives the TTL names from the primary exchange and queue.
    ///
    /// # Parameters
    /// * `exchange` - Name of the primary exchange
    /// * `queue` - Name of the primary queue
    ///
    /// # Returns
    /// The route with `_TTL` appended to both names
    pub fn new(exchange: &str, queue: &str) -> TtlRoute {
        TtlRoute {
            exchange: format!("{exchange}{TTL_SUFFIX}"),
            queue: format!("{queue}{TTL_SUFFIX}"),
        }
    }
}

/// How an actor defers delivery of a delayed publish.
///
/// Selected once per actor by [`DelayStrategy::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayStrategy {
    Immediate,
    Native,
    Ttl(TtlRoute),
}

impl DelayStrategy {
    /// Picks the strategy for an actor publishing to `exchange` for `queue`.
    ///
    /// TTL objects exist whenever the delay type is TTL; the delayed-message
    /// exchange type is only used when the actor is also flagged as delayed.
    pub fn select(config: &ActorConfig, exchange: &str, queue: &str) -> DelayStrategy {
        match (config.delay_type, config.delayed) {
            (DelayType::Ttl, _) => DelayStrategy::Ttl(TtlRoute::new(exchange, queue)),
            (DelayType::Native, true) => DelayStrategy::Native,
            _ => DelayStrategy::Immediate,
        }
    }

    /// Definition of the primary exchange under this strategy.
    pub fn primary_exchange(&self, name: &str) -> ExchangeDefinition {
        match self {
            DelayStrategy::Native => ExchangeDefinition::replicated_direct(name).direct_delayed(),
            _ => ExchangeDefinition::replicated_direct(name),
        }
    }

    /// Extra exchanges this strategy needs, declared alongside the primary one.
    pub fn delay_exchanges(&self) -> Vec<ExchangeDefinition> {
        match self {
            DelayStrategy::Ttl(route) => vec![ExchangeDefinition::replicated_direct(&route.exchange)],
            _ => vec![],
        }
    }

    /// Extra queues this strategy needs, declared after the primary queue.
    ///
    /// The TTL queue is routed by the primary queue name and dead-letters into
    /// the primary exchange, so an expired message keeps that routing key and
    /// lands in the primary queue.
    pub fn delay_queues(
        &self,
        connection: &dyn ConnectionProvider,
        primary_exchange: &str,
        queue: &str,
    ) -> Vec<QueueDefinition> {
        match self {
            DelayStrategy::Ttl(route) => vec![QueueDefinition::new(&route.queue)
                .exchange(&route.exchange)
                .routing_key(queue)
                .args(connection.rmq_opts(primary_exchange))],
            _ => vec![],
        }
    }

    /// Destination exchange and properties of a message delayed by `delay_ms`.
    ///
    /// # Parameters
    /// * `primary_exchange` - Name of the actor's primary exchange
    /// * `delay_ms` - Requested delay in milliseconds
    ///
    /// # Returns
    /// The exchange to publish to and the persistent properties carrying the
    /// delay, or `PublishingError` when the delay does not fit the signed 64-bit
    /// range the broker reads
    pub fn delayed_delivery<'s>(
        &'s self,
        primary_exchange: &'s str,
        delay_ms: u64,
    ) -> Result<(&'s str, BasicProperties), AmqpError> {
        let delay = LongLongInt::try_from(delay_ms).map_err(|_| {
            AmqpError::PublishingError(format!(
                "delay of {delay_ms}ms exceeds the maximum of {}ms",
                LongLongInt::MAX
            ))
        })?;
        let properties = BasicProperties::default().with_delivery_mode(PERSISTENT_DELIVERY_MODE);

        match self {
            DelayStrategy::Ttl(route) => Ok((
                route.exchange.as_str(),
                properties.with_expiration(ShortString::from(delay.to_string())),
            )),
            DelayStrategy::Native | DelayStrategy::Immediate => {
                let mut headers = FieldTable::default();
                headers.insert(
                    ShortString::from(AMQP_HEADERS_DELAY),
                    AMQPValue::LongLongInt(delay),
                );
                Ok((primary_exchange, properties.with_headers(headers)))
            }
        }
    }

    /// Names of the TTL objects, when the strategy uses them.
    pub fn ttl_route(&self) -> Option<&TtlRoute> {
        match self {
            DelayStrategy::Ttl(route) => Some(route),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeKind, AMQP_HEADERS_DELAYED_EXCHANGE_TYPE};

    fn config(delayed: bool, delay_type: DelayType) -> ActorConfig {
        ActorConfig {
            exchange: "orders".to_owned(),
            prefix: "svc".to_owned(),
            delayed,
            delay_type,
        }
    }

    #[test]
    fn should_select_strategy_from_config() {
        let select = |delayed, kind| DelayStrategy::select(&config(delayed, kind), "orders", "svc.created");

        assert_eq!(select(false, DelayType::None), DelayStrategy::Immediate);
        assert_eq!(select(false, DelayType::Native), DelayStrategy::Immediate);
        assert_eq!(select(true, DelayType::Native), DelayStrategy::Native);
        assert_eq!(
            select(true, DelayType::Ttl),
            DelayStrategy::Ttl(TtlRoute {
                exchange: "orders_TTL".to_owned(),
                queue: "svc.created_TTL".to_owned(),
            })
        );
        assert!(select(false, DelayType::Ttl).ttl_route().is_some());
    }

    #[test]
    fn should_only_delay_primary_exchange_natively() {
        let native = DelayStrategy::Native.primary_exchange("orders");
        assert_eq!(native.kind(), &ExchangeKind::XMessageDelayed);
        assert!(native.param(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE).is_some());
        assert!(DelayStrategy::Native.delay_exchanges().is_empty());

        let ttl = DelayStrategy::Ttl(TtlRoute::new("orders", "svc.created"));
        assert_eq!(ttl.primary_exchange("orders").kind(), &ExchangeKind::Direct);
        assert_eq!(ttl.delay_exchanges().len(), 1);
        assert_eq!(ttl.delay_exchanges()[0].name(), "orders_TTL");
    }

    #[test]
    fn should_route_ttl_delivery_through_ttl_exchange() {
        let ttl = DelayStrategy::Ttl(TtlRoute::new("orders", "svc.created"));

        let (exchange, props) = ttl.delayed_delivery("orders", 5000).unwrap();

        assert_eq!(exchange, "orders_TTL");
        assert_eq!(props.expiration(), &Some(ShortString::from("5000")));
        assert_eq!(props.delivery_mode(), &Some(PERSISTENT_DELIVERY_MODE));
        assert_eq!(props.headers(), &None);
    }

    #[test]
    fn should_attach_delay_header_for_native_delivery() {
        let (exchange, props) = DelayStrategy::Native.delayed_delivery("orders", 5000).unwrap();

        assert_eq!(exchange, "orders");
        assert_eq!(props.expiration(), &None);
        assert_eq!(props.delivery_mode(), &Some(PERSISTENT_DELIVERY_MODE));
        assert_eq!(
            props
                .headers()
                .as_ref()
                .and_then(|h| h.inner().get(&ShortString::from(AMQP_HEADERS_DELAY))),
            Some(&AMQPValue::LongLongInt(5000))
        );
    }

    #[test]
    fn should_reject_delay_beyond_signed_range_in_every_mode() {
        let ttl = DelayStrategy::Ttl(TtlRoute::new("orders", "svc.created"));
        let too_long = LongLongInt::MAX as u64 + 1;

        for strategy in [DelayStrategy::Native, DelayStrategy::Immediate, ttl] {
            assert!(matches!(
                strategy.delayed_delivery("orders", too_long),
                Err(AmqpError::PublishingError(_))
            ));
            assert!(strategy.delayed_delivery("orders", LongLongInt::MAX as u64).is_ok());
        }
    }
}
