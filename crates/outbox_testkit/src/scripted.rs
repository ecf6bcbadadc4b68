//! HTTP client with scripted responses.

use outbox_engine::{HttpClient, HttpFuture, HttpRequest, HttpResponse, HttpResult};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// An [`HttpClient`] that answers from a script.
///
/// Each request consumes the next scripted result; once the script runs out
/// every request gets the fallback.
pub struct ScriptedClient {
    script: Mutex<VecDeque<HttpResult<HttpResponse>>>,
    fallback: HttpResult<HttpResponse>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedClient {
    /// Creates a client whose fallback is an empty `200`.
    pub fn new() -> Self {
        Self::with_fallback(Ok(HttpResponse::new(200, "")))
    }

    /// Creates a client with an explicit fallback.
    pub fn with_fallback(fallback: HttpResult<HttpResponse>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Appends a scripted result.
    pub fn then(self, result: HttpResult<HttpResponse>) -> Self {
        self.script.lock().push_back(result);
        self
    }

    /// Appends a scripted result to a shared client.
    pub fn push(&self, result: HttpResult<HttpResponse>) {
        self.script.lock().push_back(result);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of scripted results not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ScriptedClient {
    fn send(&self, request: HttpRequest) -> HttpFuture<'_> {
        self.requests.lock().push(request);
        let result = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_engine::HttpError;

    #[tokio::test]
    async fn script_then_fallback() {
        let client = ScriptedClient::with_fallback(Err(HttpError::Timeout))
            .then(Ok(HttpResponse::new(201, "{}")));

        assert_eq!(
            client.send(HttpRequest::get("/a")).await.unwrap().status,
            201
        );
        assert_eq!(
            client.send(HttpRequest::get("/b")).await,
            Err(HttpError::Timeout)
        );
        assert_eq!(client.requests().len(), 2);
        assert_eq!(client.remaining(), 0);
    }
}
