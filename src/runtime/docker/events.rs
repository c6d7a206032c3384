use std::collections::HashMap;
use bollard::{Docker, models::EventMessage, query_parameters::EventsOptionsBuilder};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use crate::runtime::engine::{EngineStream, HealthEvent};
use crate::runtime::error::RuntimeError;

// Docker reports health transitions as `health_status: <status>`.
fn health_event(message: EventMessage) -> Option<HealthEvent> {
    let status = message.action?.strip_prefix("health_status:")?.trim().to_string();
    let container_id = message.actor.and_then(|actor| actor.id).unwrap_or_default();

    Some(HealthEvent { container_id, status })
}

pub(super) fn health_events(docker: &Docker, container_id: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> EngineStream<'static, HealthEvent> {
    let filters = HashMap::from([
        ("container".to_string(), vec![container_id.to_string()]),
        ("event".to_string(), vec!["health_status".to_string()]),
    ]);

    let options = EventsOptionsBuilder::new()
        .since(&since.timestamp().to_string())
        .until(&until.timestamp().to_string())
        .filters(&filters)
        .build();

    let stream = docker.events(Some(options)).filter_map(|item| async move {
        match item {
            Ok(message) => health_event(message).map(Ok),
            Err(e) => Some(Err(RuntimeError::from(e))),
        }
    });

    Box::pin(stream)
}
