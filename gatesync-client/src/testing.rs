//! In-memory [`HttpTransport`] that replays scripted replies in order and
//! records every request it sees.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

use crate::transport::{HttpResponse, HttpTransport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub form: Vec<(String, String)>,
    pub bearer: Option<String>,
}

impl RecordedRequest {
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

struct Scripted {
    /// Substring the request URL must contain.
    url_part: String,
    reply: Result<HttpResponse, TransportError>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON reply for the next request whose URL contains `url_part`.
    pub fn reply_json(&self, url_part: &str, status: u16, body: Value) -> &Self {
        self.reply(url_part, Ok(HttpResponse::new(status, body.to_string())))
    }

    pub fn reply_raw(&self, url_part: &str, status: u16, body: &str) -> &Self {
        self.reply(url_part, Ok(HttpResponse::new(status, body)))
    }

    pub fn fail(&self, url_part: &str, err: TransportError) -> &Self {
        self.reply(url_part, Err(err))
    }

    fn reply(&self, url_part: &str, reply: Result<HttpResponse, TransportError>) -> &Self {
        self.replies
            .lock()
            .expect("scripted replies poisoned")
            .push_back(Scripted {
                url_part: url_part.to_string(),
                reply,
            });
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests poisoned").clone()
    }

    /// Replies queued but never consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("scripted replies poisoned").len()
    }

    fn next(&self, request: RecordedRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        self.requests
            .lock()
            .expect("requests poisoned")
            .push(request);

        let mut replies = self.replies.lock().expect("scripted replies poisoned");
        match replies.pop_front() {
            Some(scripted) if url.contains(&scripted.url_part) => scripted.reply,
            Some(scripted) => Err(TransportError::Other(format!(
                "scripted transport expected a request to '*{}*', got {url}",
                scripted.url_part
            ))),
            None => Err(TransportError::Other(format!(
                "scripted transport has no reply for {url}"
            ))),
        }
    }
}

impl HttpTransport for ScriptedTransport {
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
        self.next(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            form: form
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            bearer: None,
        })
    }

    fn get_with_bearer(&self, url: &str, token: &str) -> Result<HttpResponse, TransportError> {
        self.next(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            form: Vec::new(),
            bearer: Some(token.to_string()),
        })
    }
}
