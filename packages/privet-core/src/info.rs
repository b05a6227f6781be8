//! One-shot device status queries.
//!
//! Each query resolves its own client and is forgotten after its terminal
//! answer. Queries do not coordinate with each other or with registration.

use crate::device::DeviceRegistry;
use crate::error::DiscoveryError;
use crate::event::{EventEmitter, UiEvent};
use crate::message::{InfoStep, Message, MessageSender, QueryId, Responder};
use crate::ports::{DeviceHttpClient, HttpClientFactory, InfoOperation, InfoResponse};
use std::collections::HashMap;
use std::sync::Arc;

const HTTP_OK: u16 = 200;

struct InfoQuery {
    device_name: String,
    operation: Option<Box<dyn InfoOperation>>,
    client: Option<Box<dyn DeviceHttpClient>>,
}

pub struct InfoQueries {
    http: Arc<dyn HttpClientFactory>,
    tx: MessageSender,
    events: EventEmitter,
    last_query: QueryId,
    in_flight: HashMap<QueryId, InfoQuery>,
}

fn responder<T: 'static>(tx: &MessageSender, query: QueryId, wrap: fn(T) -> InfoStep) -> Responder<T> {
    Responder::new(tx.clone(), move |value| Message::Info {
        query,
        step: wrap(value),
    })
}

impl InfoQueries {
    pub fn new(http: Arc<dyn HttpClientFactory>, tx: MessageSender, events: EventEmitter) -> Self {
        Self {
            http,
            tx,
            events,
            last_query: 0,
            in_flight: HashMap::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn request_info(&mut self, name: &str, registry: &DeviceRegistry) {
        self.last_query += 1;
        let query = self.last_query;
        let address = registry.address_of(name);
        tracing::debug!("Info query {} for '{}' at {}", query, name, address);

        self.in_flight.insert(
            query,
            InfoQuery {
                device_name: name.to_string(),
                operation: None,
                client: None,
            },
        );
        self.http
            .create_client(name, &address, responder(&self.tx, query, InfoStep::ClientResolved));
    }

    pub fn handle_step(&mut self, query: QueryId, step: InfoStep) {
        match step {
            InfoStep::ClientResolved(client) => self.on_client_resolved(query, client),
            InfoStep::Done(response) => self.on_done(query, response),
        }
    }

    fn on_client_resolved(&mut self, query: QueryId, client: Option<Box<dyn DeviceHttpClient>>) {
        let Some(entry) = self.in_flight.get_mut(&query) else {
            tracing::debug!("Discarding client for finished info query {}", query);
            return;
        };
        let Some(client) = client else {
            let name = entry.device_name.clone();
            self.finish(query, &name);
            return self.fail(DiscoveryError::Resolution);
        };

        let mut operation =
            client.create_info_operation(responder(&self.tx, query, InfoStep::Done));
        operation.start();
        entry.operation = Some(operation);
        entry.client = Some(client);
    }

    fn on_done(&mut self, query: QueryId, response: InfoResponse) {
        let Some(entry) = self.in_flight.remove(&query) else {
            tracing::debug!("Discarding answer for unknown info query {}", query);
            return;
        };
        drop(entry);

        match response.payload {
            Some(payload) if response.http_code == HTTP_OK => {
                self.events.emit(UiEvent::InfoResult { payload });
            }
            _ => self.fail(DiscoveryError::InfoHttp(response.http_code)),
        }
    }

    fn finish(&mut self, query: QueryId, name: &str) {
        self.in_flight.remove(&query);
        tracing::debug!("Info query {} for '{}' finished", query, name);
    }

    fn fail(&self, error: DiscoveryError) {
        tracing::error!("Info query failed: {}", error);
        self.events.emit(UiEvent::InfoFailed {
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::event::UiEvent;
    use crate::testing::{device, Harness};
    use crate::Command;
    use serde_json::json;

    fn request_info(h: &mut Harness, name: &str) {
        h.command(Command::RequestInfo {
            name: name.to_string(),
        });
    }

    #[test]
    fn test_info_success_emits_payload() {
        let mut h = Harness::new();
        h.add_device(device("Printer1", "https://cp.example"));
        h.events();

        request_info(&mut h, "Printer1");
        assert!(h.rec.calls().contains(&"create_client:Printer1@printer1.local:8080".to_string()));
        assert_eq!(h.controller.info().in_flight(), 1);

        h.resolve_client("Printer1", true);
        assert!(h.rec.calls().ends_with(&["info_op".to_string(), "info_start".to_string()]));

        let payload = json!({ "name": "Printer1", "x-privet-token": "abc" });
        h.answer_info(200, Some(payload.clone()));
        assert_eq!(h.events(), vec![UiEvent::InfoResult { payload }]);
        assert_eq!(h.controller.info().in_flight(), 0);
        assert_eq!(h.rec.count("drop_info_op"), 1);
        assert_eq!(h.rec.count("drop_client:Printer1"), 1);
    }

    #[test]
    fn test_info_http_error() {
        let mut h = Harness::new();
        h.add_device(device("Printer1", "https://cp.example"));
        h.events();

        request_info(&mut h, "Printer1");
        h.resolve_client("Printer1", true);
        h.answer_info(404, None);
        assert_eq!(
            h.events(),
            vec![UiEvent::InfoFailed {
                message: "HTTP error 404".to_string()
            }]
        );

        // A 200 without a payload is still an error
        request_info(&mut h, "Printer1");
        h.resolve_client("Printer1", true);
        h.answer_info(200, None);
        assert_eq!(
            h.events(),
            vec![UiEvent::InfoFailed {
                message: "HTTP error 200".to_string()
            }]
        );
    }

    #[test]
    fn test_info_resolution_failure() {
        let mut h = Harness::new();
        request_info(&mut h, "Ghost");
        h.resolve_client("Ghost", false);

        assert_eq!(
            h.events(),
            vec![UiEvent::InfoFailed {
                message: "Resolution failed".to_string()
            }]
        );
        assert_eq!(h.controller.info().in_flight(), 0);
    }

    #[test]
    fn test_info_queries_are_independent_of_registration() {
        let mut h = Harness::new();
        h.add_device(device("Printer1", "https://cp.example"));
        h.register("Printer1");
        request_info(&mut h, "Printer1");
        request_info(&mut h, "Printer1");
        assert_eq!(h.controller.info().in_flight(), 2);
        assert_eq!(h.rec.pending_clients(), 3);

        // Registration client first, then both info clients
        h.resolve_client("Printer1", true);
        h.resolve_client("Printer1", true);
        h.resolve_client("Printer1", true);
        h.answer_info(200, Some(json!({})));
        h.answer_info(500, None);

        assert_eq!(h.controller.info().in_flight(), 0);
        assert!(!h.controller.registration().is_idle());
    }
}
