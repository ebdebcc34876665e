//! Scripted session double: records traffic and replays canned shadow
//! responses from a delivery thread.
//!
//! Every publish to a shadow request topic releases the next scripted batch.
//! Batches are delivered in order by a single feeder thread so the
//! reconciliation loop observes them exactly as a broker would push them.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde_json::{Value, json};

use crate::session::{MessageSink, Session, SessionError};
use crate::shutdown::Shutdown;

const SHADOW_PREFIX: &str = "$aws/things/";

/// One scripted inbound event.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// A message on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// The connection drops.
    ConnectionLost,
    /// The operator requests shutdown.
    Shutdown,
}

/// Accepted response to an update reporting `token`.
pub fn accepted_update(thing: &str, key: &str, token: &str) -> Scripted {
    message(
        format!("{SHADOW_PREFIX}{thing}/shadow/update/accepted"),
        &json!({ "state": { "reported": { key: token } } }),
    )
}

/// Delta announcing `token` as the desired value.
pub fn delta(thing: &str, key: &str, token: &str) -> Scripted {
    message(
        format!("{SHADOW_PREFIX}{thing}/shadow/update/delta"),
        &json!({ "state": { key: token } }),
    )
}

/// Rejected response to an update.
pub fn rejected_update(thing: &str, code: u16, reason: &str) -> Scripted {
    message(
        format!("{SHADOW_PREFIX}{thing}/shadow/update/rejected"),
        &json!({ "code": code, "message": reason }),
    )
}

/// Accepted response to a `get` carrying a desired token.
pub fn accepted_get(thing: &str, key: &str, desired: &str) -> Scripted {
    message(
        format!("{SHADOW_PREFIX}{thing}/shadow/get/accepted"),
        &json!({ "state": { "desired": { key: desired } }, "version": 3 }),
    )
}

fn message(topic: String, body: &Value) -> Scripted {
    Scripted::Message {
        topic,
        payload: body.to_string().into_bytes(),
    }
}

#[derive(Default)]
struct Traffic {
    publishes: Vec<(String, Vec<u8>)>,
    subscriptions: Vec<String>,
    sink: Option<Arc<dyn MessageSink>>,
    replies: VecDeque<Vec<Scripted>>,
    refused_topics: Vec<String>,
    disconnects: usize,
}

/// Session double driven by a script of reply batches.
pub struct ScriptedSession {
    traffic: Arc<Mutex<Traffic>>,
    feeder: Option<Sender<Vec<Scripted>>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ScriptedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSession").finish_non_exhaustive()
    }
}

impl ScriptedSession {
    /// Builds a session whose `Shutdown` items request `shutdown`.
    pub fn new(shutdown: Shutdown) -> Self {
        let traffic = Arc::new(Mutex::new(Traffic::default()));
        let (feeder, batches) = mpsc::channel::<Vec<Scripted>>();
        let worker_traffic = Arc::clone(&traffic);
        let worker = thread::spawn(move || {
            for batch in batches {
                for item in batch {
                    deliver(&worker_traffic, &shutdown, item);
                }
            }
        });
        Self {
            traffic,
            feeder: Some(feeder),
            worker: Some(worker),
        }
    }

    /// Queues a batch released by the next shadow request.
    pub fn reply(&self, batch: Vec<Scripted>) {
        self.lock().replies.push_back(batch);
    }

    /// Makes every publish to `topic` fail.
    pub fn refuse_publishes_to(&self, topic: &str) {
        self.lock().refused_topics.push(topic.to_owned());
    }

    /// Inspection handle that outlives borrows of the session.
    pub fn probe(&self) -> SessionProbe {
        SessionProbe {
            traffic: Arc::clone(&self.traffic),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Traffic> {
        self.traffic.lock().expect("session traffic mutex poisoned")
    }
}

fn deliver(traffic: &Mutex<Traffic>, shutdown: &Shutdown, item: Scripted) {
    let sink = traffic
        .lock()
        .expect("session traffic mutex poisoned")
        .sink
        .clone();
    match (item, sink) {
        (Scripted::Message { topic, payload }, Some(sink)) => sink.deliver(&topic, &payload),
        (Scripted::ConnectionLost, Some(sink)) => sink.connection_lost(),
        (Scripted::Shutdown, _) => shutdown.request(),
        (_, None) => {}
    }
}

impl Session for ScriptedSession {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        let batch = {
            let mut traffic = self.lock();
            if traffic.refused_topics.iter().any(|refused| refused == topic) {
                return Err(SessionError::Publish {
                    topic: topic.to_owned(),
                    message: String::from("scripted refusal"),
                });
            }
            traffic.publishes.push((topic.to_owned(), payload.to_vec()));
            if topic.starts_with(SHADOW_PREFIX) {
                traffic.replies.pop_front()
            } else {
                None
            }
        };
        if let (Some(batch), Some(feeder)) = (batch, self.feeder.as_ref()) {
            feeder.send(batch).expect("feeder thread should be running");
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str, sink: Arc<dyn MessageSink>) -> Result<(), SessionError> {
        let mut traffic = self.lock();
        traffic.subscriptions.push(topic.to_owned());
        traffic.sink = Some(sink);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        self.lock().disconnects += 1;
        Ok(())
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        drop(self.feeder.take());
        if let Some(worker) = self.worker.take() {
            // A panicking feeder already failed the test that owns it.
            drop(worker.join());
        }
    }
}

/// Read-only view of a [`ScriptedSession`]'s traffic.
#[derive(Clone)]
pub struct SessionProbe {
    traffic: Arc<Mutex<Traffic>>,
}

impl SessionProbe {
    /// Topics published to, in order.
    pub fn published_topics(&self) -> Vec<String> {
        self.lock()
            .publishes
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Decoded payloads published to `topic`, in order.
    pub fn payloads_on(&self, topic: &str) -> Vec<Value> {
        self.lock()
            .publishes
            .iter()
            .filter(|(published, _)| published == topic)
            .map(|(_, payload)| {
                serde_json::from_slice(payload).unwrap_or(Value::Null)
            })
            .collect()
    }

    /// Tokens reported under `key` through the update topic of `thing`.
    pub fn reported_tokens(&self, thing: &str, key: &str) -> Vec<String> {
        self.payloads_on(&format!("{SHADOW_PREFIX}{thing}/shadow/update"))
            .iter()
            .filter_map(|body| body["state"]["reported"][key].as_str().map(str::to_owned))
            .collect()
    }

    /// Topics subscribed to, in order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    /// Number of completed disconnects.
    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Traffic> {
        self.traffic.lock().expect("session traffic mutex poisoned")
    }
}
