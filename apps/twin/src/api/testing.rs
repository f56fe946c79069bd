//! Scripted in-memory `DataSource` for tests.

use crate::api::client::{DataSource, FetchError};
use crate::api::query::Query;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Reply {
    body: Option<Value>,
    delay: Duration,
}

/// Replies are queued per endpoint; the last queued reply repeats forever.
/// Unscripted endpoints answer 404.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, endpoint: &'static str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    pub fn reply(&self, endpoint: &'static str, body: Value) {
        self.reply_after(endpoint, body, Duration::ZERO);
    }

    pub fn reply_after(&self, endpoint: &'static str, body: Value, delay: Duration) {
        self.push(
            endpoint,
            Reply {
                body: Some(body),
                delay,
            },
        );
    }

    pub fn fail(&self, endpoint: &'static str) {
        self.push(
            endpoint,
            Reply {
                body: None,
                delay: Duration::ZERO,
            },
        );
    }

    /// Every query seen so far, in `endpoint?k=v` form.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.split('?').next() == Some(endpoint))
            .count()
    }

    fn next_reply(&self, endpoint: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(endpoint)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl DataSource for ScriptedSource {
    async fn get_json(&self, query: &Query) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(query.to_string());
        let reply = self.next_reply(query.endpoint);

        let Some(reply) = reply else {
            return Err(FetchError::Status {
                query: query.to_string(),
                status: 404,
            });
        };

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        reply.body.ok_or_else(|| FetchError::Status {
            query: query.to_string(),
            status: 503,
        })
    }
}
