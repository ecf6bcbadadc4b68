//! Mutation dispatcher.
//!
//! Turns one queued mutation into one HTTP request. The (entity kind,
//! operation kind) pair selects a [`Route`]; the payload's `id` completes the
//! path for routes that address a single entity.

use crate::error::{DispatchError, DispatchResult};
use crate::http::{HttpClient, HttpMethod, HttpRequest};
use crate::mutation::{payload_id, EntityKind, OperationKind, QueuedMutation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// How one (entity kind, operation kind) pair maps to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Request method.
    pub method: HttpMethod,
    /// Collection path, e.g. `/creators`.
    pub collection: String,
    /// Whether the payload id is appended to the path.
    pub addresses_entity: bool,
    /// Whether the payload is sent as the body.
    pub sends_body: bool,
}

impl Route {
    /// `POST /{collection}` with the payload as body.
    pub fn create(collection: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            collection: collection.into(),
            addresses_entity: false,
            sends_body: true,
        }
    }

    /// `PATCH /{collection}/{id}` with the payload as body.
    pub fn update(collection: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Patch,
            collection: collection.into(),
            addresses_entity: true,
            sends_body: true,
        }
    }

    /// `DELETE /{collection}/{id}` without a body.
    pub fn delete(collection: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            collection: collection.into(),
            addresses_entity: true,
            sends_body: false,
        }
    }

    /// The conventional route for an operation on a collection.
    pub fn for_operation(operation: OperationKind, collection: impl Into<String>) -> Self {
        match operation {
            OperationKind::Create => Self::create(collection),
            OperationKind::Update => Self::update(collection),
            OperationKind::Delete => Self::delete(collection),
        }
    }
}

/// Table of supported (entity kind, operation kind) pairs.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<(EntityKind, OperationKind), Route>,
}

impl RouteTable {
    /// Creates a table with no routes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The backend's write endpoints.
    ///
    /// Submissions cannot be deleted and payouts are immutable once issued.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for entity in EntityKind::ALL {
            for operation in OperationKind::ALL {
                let supported = !matches!(
                    (entity, operation),
                    (EntityKind::Submission, OperationKind::Delete)
                        | (EntityKind::Payout, OperationKind::Update)
                        | (EntityKind::Payout, OperationKind::Delete)
                );
                if supported {
                    let collection = format!("/{}", entity.collection());
                    table = table.with_route(
                        entity,
                        operation,
                        Route::for_operation(operation, collection),
                    );
                }
            }
        }
        table
    }

    /// Adds or replaces a route.
    pub fn with_route(mut self, entity: EntityKind, operation: OperationKind, route: Route) -> Self {
        self.routes.insert((entity, operation), route);
        self
    }

    /// Removes a route.
    pub fn without_route(mut self, entity: EntityKind, operation: OperationKind) -> Self {
        self.routes.remove(&(entity, operation));
        self
    }

    /// Looks up a route.
    pub fn route(&self, entity: EntityKind, operation: OperationKind) -> Option<&Route> {
        self.routes.get(&(entity, operation))
    }

    /// Returns true if the pair can be dispatched.
    pub fn supports(&self, entity: EntityKind, operation: OperationKind) -> bool {
        self.route(entity, operation).is_some()
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Response status.
    pub status: u16,
    /// Canonical entity returned by the backend, if any.
    pub entity: Option<Value>,
}

/// Sends queued mutations to the backend.
pub struct Dispatcher<C: HttpClient> {
    client: Arc<C>,
    routes: RouteTable,
}

impl<C: HttpClient> Dispatcher<C> {
    /// Creates a dispatcher.
    pub fn new(client: Arc<C>, routes: RouteTable) -> Self {
        Self { client, routes }
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Returns the route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Builds the request for a mutation without sending it.
    pub fn build_request(&self, mutation: &QueuedMutation) -> DispatchResult<HttpRequest> {
        let route = self
            .routes
            .route(mutation.entity, mutation.operation)
            .ok_or(DispatchError::Unsupported {
                entity: mutation.entity,
                operation: mutation.operation,
            })?;

        let path = if route.addresses_entity {
            let id = payload_id(&mutation.payload).ok_or_else(|| {
                DispatchError::InvalidPayload(format!(
                    "{} {} requires an `id` field",
                    mutation.operation, mutation.entity
                ))
            })?;
            format!(
                "{}/{}",
                route.collection.trim_end_matches('/'),
                urlencoding::encode(&id)
            )
        } else {
            route.collection.clone()
        };

        let request = HttpRequest::new(route.method, path);
        Ok(if route.sends_body {
            request.with_body(mutation.payload.clone())
        } else {
            request
        })
    }

    /// Sends one mutation.
    ///
    /// Never panics and never retries; the caller decides what a failure
    /// means for the mutation.
    pub async fn dispatch(&self, mutation: &QueuedMutation) -> DispatchResult<DispatchOutcome> {
        let request = self.build_request(mutation)?;
        debug!(
            id = %mutation.id,
            method = %request.method,
            path = %request.path,
            "dispatching mutation"
        );

        let response = self.client.send(request).await?;
        if !response.is_success() {
            return Err(DispatchError::Status {
                status: response.status,
                body: response.body,
            });
        }

        Ok(DispatchOutcome {
            status: response.status,
            entity: response.json(),
        })
    }
}
