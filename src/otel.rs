// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Context Propagation
//!
//! Injects the caller's trace context into outgoing AMQP headers through the
//! globally installed text map propagator. Without an installed propagator
//! nothing is written.

use lapin::types::{AMQPValue, FieldTable, ShortString};
use opentelemetry::{global, propagation::Injector, Context};
use std::collections::BTreeMap;

/// Writes propagation fields into a RabbitMQ header map.
pub(crate) struct RabbitMQTracePropagator<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> RabbitMQTracePropagator<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for RabbitMQTracePropagator<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

/// Merges the current trace context into `headers`.
///
/// Existing entries win over propagation fields of the same name. Returns
/// `None` when there is nothing to send.
pub(crate) fn with_trace_context(headers: Option<FieldTable>) -> Option<FieldTable> {
    let mut btree = BTreeMap::<ShortString, AMQPValue>::default();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(
            &Context::current(),
            &mut RabbitMQTracePropagator::new(&mut btree),
        )
    });

    if let Some(existing) = headers {
        btree.extend(existing.inner().clone());
    }

    if btree.is_empty() {
        None
    } else {
        Some(FieldTable::from(btree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_lowercase_injected_keys() {
        let mut btree = BTreeMap::default();
        RabbitMQTracePropagator::new(&mut btree).set("TraceParent", "00-abc".to_owned());

        assert_eq!(
            btree.get(&ShortString::from("traceparent")),
            Some(&AMQPValue::LongString("00-abc".into()))
        );
    }

    #[test]
    fn should_keep_existing_headers_without_propagator() {
        let mut headers = FieldTable::default();
        headers.insert("x-delay".into(), AMQPValue::LongLongInt(10));

        let merged = with_trace_context(Some(headers.clone()));

        assert_eq!(merged, Some(headers));
        assert_eq!(with_trace_context(None), None);
    }
}
