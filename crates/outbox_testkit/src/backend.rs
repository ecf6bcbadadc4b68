//! In-process fake of the backend's write endpoints.
//!
//! [`FakeBackend`] implements [`LoopbackServer`], so an engine built with a
//! [`LoopbackClient`](outbox_engine::LoopbackClient) talks to it without
//! sockets. It stores entities per collection, logs every request and can be
//! told to fail.

use outbox_engine::{HttpError, HttpMethod, HttpRequest, HttpResponse, HttpResult, LoopbackServer};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// How an injected failure manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Respond with this status and a short body.
    Status(u16),
    /// Fail at the transport level.
    Transport,
    /// Fail with a timeout.
    Timeout,
}

impl Failure {
    fn into_result(self) -> HttpResult<HttpResponse> {
        match self {
            Failure::Status(status) => Ok(HttpResponse::new(status, format!("injected {status}"))),
            Failure::Transport => Err(HttpError::Transport("connection reset".into())),
            Failure::Timeout => Err(HttpError::Timeout),
        }
    }
}

/// A fake REST backend.
#[derive(Debug)]
pub struct FakeBackend {
    entities: Mutex<BTreeMap<(String, String), Value>>,
    requests: Mutex<Vec<HttpRequest>>,
    queued_failures: Mutex<VecDeque<Failure>>,
    path_failures: Mutex<Vec<(String, Failure)>>,
    healthy: AtomicBool,
    next_id: AtomicU64,
    health_path: String,
}

impl FakeBackend {
    /// Creates an empty, healthy backend with a `/health` endpoint.
    pub fn new() -> Self {
        Self {
            entities: Mutex::new(BTreeMap::new()),
            requests: Mutex::new(Vec::new()),
            queued_failures: Mutex::new(VecDeque::new()),
            path_failures: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            health_path: "/health".to_string(),
        }
    }

    /// Seeds an entity.
    pub fn with_entity(self, collection: &str, id: &str, entity: Value) -> Self {
        self.seed(collection, id, entity);
        self
    }

    /// Stores an entity without logging a request.
    pub fn seed(&self, collection: &str, id: &str, entity: Value) {
        self.entities
            .lock()
            .insert((collection.to_string(), id.to_string()), entity);
    }

    /// Fails the next `count` write requests with `failure`.
    pub fn fail_next(&self, count: usize, failure: Failure) {
        let mut failures = self.queued_failures.lock();
        for _ in 0..count {
            failures.push_back(failure.clone());
        }
    }

    /// Fails every write request whose path is `path` until cleared.
    pub fn fail_path(&self, path: impl Into<String>, failure: Failure) {
        self.path_failures.lock().push((path.into(), failure));
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.queued_failures.lock().clear();
        self.path_failures.lock().clear();
    }

    /// Makes the health endpoint succeed or fail.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Every request received, health checks excluded.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests as `"METHOD /path"` lines, health checks excluded.
    pub fn request_lines(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    /// Forgets the request log.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Returns a stored entity.
    pub fn entity(&self, collection: &str, id: &str) -> Option<Value> {
        self.entities
            .lock()
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    /// Number of entities stored in a collection.
    pub fn entity_count(&self, collection: &str) -> usize {
        self.entities
            .lock()
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }

    fn injected_failure(&self, path: &str) -> Option<Failure> {
        if let Some(failure) = self.queued_failures.lock().pop_front() {
            return Some(failure);
        }
        self.path_failures
            .lock()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, failure)| failure.clone())
    }

    fn apply(&self, request: &HttpRequest) -> HttpResponse {
        let segments: Vec<&str> = request
            .path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let (collection, id) = match segments.as_slice() {
            [collection] => (collection.to_string(), None),
            [collection, id] => match urlencoding::decode(id) {
                Ok(id) => (collection.to_string(), Some(id.into_owned())),
                Err(_) => return HttpResponse::new(400, "bad id"),
            },
            _ => return HttpResponse::new(404, "no such route"),
        };

        let mut entities = self.entities.lock();
        match (request.method, id) {
            (HttpMethod::Post, None) => {
                let mut entity = request.body.clone().unwrap_or_else(|| json!({}));
                let id = match outbox_engine::payload_id(&entity) {
                    Some(id) => id,
                    None => {
                        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
                        if let Some(object) = entity.as_object_mut() {
                            object.insert("id".into(), Value::String(id.clone()));
                        }
                        id
                    }
                };
                entities.insert((collection, id), entity.clone());
                HttpResponse::new(201, entity.to_string())
            }
            (HttpMethod::Patch | HttpMethod::Put, Some(id)) => {
                let Some(stored) = entities.get_mut(&(collection, id)) else {
                    return HttpResponse::new(404, "not found");
                };
                match (&mut *stored, &request.body) {
                    (Value::Object(object), Some(Value::Object(patch))) => {
                        for (key, value) in patch {
                            object.insert(key.clone(), value.clone());
                        }
                    }
                    (target, body) => *target = body.clone().unwrap_or(Value::Null),
                }
                HttpResponse::new(200, stored.to_string())
            }
            (HttpMethod::Delete, Some(id)) => match entities.remove(&(collection, id)) {
                Some(_) => HttpResponse::new(204, ""),
                None => HttpResponse::new(404, "not found"),
            },
            _ => HttpResponse::new(405, "method not allowed"),
        }
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackServer for FakeBackend {
    fn handle(&self, request: &HttpRequest) -> HttpResult<HttpResponse> {
        if request.path == self.health_path {
            return if self.healthy.load(Ordering::SeqCst) {
                Ok(HttpResponse::new(200, "ok"))
            } else {
                Err(HttpError::Transport("backend unreachable".into()))
            };
        }

        self.requests.lock().push(request.clone());
        if let Some(failure) = self.injected_failure(&request.path) {
            return failure.into_result();
        }
        Ok(self.apply(request))
    }
}
