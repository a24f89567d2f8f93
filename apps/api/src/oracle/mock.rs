//! Deterministic in-memory oracle for tests. Records every call it receives.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::oracle::{ModelParameters, OracleError, OracleReply, RewriteOracle};

#[derive(Debug, Clone)]
pub struct OracleCall {
    /// Zero-based position of this call in the run.
    pub index: usize,
    pub system: String,
    pub user: String,
}

type Responder = dyn Fn(&OracleCall) -> Result<String, OracleError> + Send + Sync;

pub struct ScriptedOracle {
    responder: Box<Responder>,
    calls: Mutex<Vec<OracleCall>>,
}

impl ScriptedOracle {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&OracleCall) -> Result<String, OracleError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the same text.
    pub fn constant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Answers each call with the next entry; the last entry repeats.
    pub fn sequence(texts: Vec<String>) -> Self {
        Self::new(move |call| {
            let idx = call.index.min(texts.len().saturating_sub(1));
            Ok(texts.get(idx).cloned().unwrap_or_default())
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RewriteOracle for ScriptedOracle {
    async fn rewrite(
        &self,
        system: &str,
        user: &str,
        _params: &ModelParameters,
    ) -> Result<OracleReply, OracleError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let call = OracleCall {
                index: calls.len(),
                system: system.to_string(),
                user: user.to_string(),
            };
            calls.push(call.clone());
            call
        };

        (self.responder)(&call).map(|text| OracleReply {
            text,
            usage: serde_json::json!({}),
        })
    }
}

/// Prose-like filler of exactly `len` characters.
pub fn filler(len: usize) -> String {
    "lorem ipsum dolor sit amet consectetur adipiscing elit "
        .chars()
        .cycle()
        .take(len)
        .collect()
}
