//! Scripted probe for tests that should not touch the network.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::PollError;
use crate::probe::{GridProbe, ProbeFuture};

#[derive(Debug, Clone)]
enum Script {
    Respond(Bytes),
    Fail,
    Hang,
}

/// A [`GridProbe`] answering from a table keyed by `"{authority}{path}"`.
///
/// Unscripted keys answer HTTP 404. Every call is recorded in order.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, key: impl Into<String>, body: impl Into<String>) {
        let body = Bytes::from(body.into());
        self.scripts.lock().insert(key.into(), Script::Respond(body));
    }

    /// Make `key` fail as an unreachable endpoint.
    pub fn fail(&self, key: impl Into<String>) {
        self.scripts.lock().insert(key.into(), Script::Fail);
    }

    /// Make `key` never answer.
    pub fn hang(&self, key: impl Into<String>) {
        self.scripts.lock().insert(key.into(), Script::Hang);
    }

    pub fn forget(&self, key: &str) {
        self.scripts.lock().remove(key);
    }

    /// Keys requested so far, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }
}

impl GridProbe for ScriptedProbe {
    fn get<'a>(&'a self, authority: &'a str, path: &'a str) -> ProbeFuture<'a> {
        let key = format!("{authority}{path}");
        self.requests.lock().push(key.clone());
        let script = self.scripts.lock().get(&key).cloned();
        let uri = format!("http://{key}");

        Box::pin(async move {
            match script {
                Some(Script::Respond(body)) => Ok(body),
                Some(Script::Fail) => Err(PollError::Connect {
                    uri,
                    reason: "connection refused".to_string(),
                }),
                Some(Script::Hang) => std::future::pending().await,
                None => Err(PollError::Status { uri, status: 404 }),
            }
        })
    }
}
