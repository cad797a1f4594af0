//! Scripted transport shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use cloudmon_core::{CloudmonError, HttpRequest, HttpResponse, Result, Transport};
use reqwest::StatusCode;
use serde_json::json;

/// Replays canned responses in order and records every request.
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CloudmonError::Transport(format!("no scripted response for {}", url)))
    }
}

/// Successful auth response with token `tok-1` and a monitoring endpoint at
/// `https://monitoring.example.com/v1.0/123456`.
pub(crate) fn auth_ok() -> HttpResponse {
    HttpResponse::json(
        StatusCode::OK,
        &json!({
            "auth": {
                "token": {"id": "tok-1", "expires": "2031-01-01T00:00:00Z"},
                "serviceCatalog": {
                    "cloudMonitoring": [
                        {"region": "DFW", "publicURL": "https://monitoring.example.com/v1.0/123456", "v1Default": true}
                    ],
                    "cloudServers": [
                        {"publicURL": "https://servers.api.rackspacecloud.com/v1.0/123456"}
                    ]
                }
            }
        }),
    )
}
