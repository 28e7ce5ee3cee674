//! Shared test fixtures: a scripted in-process completion backend.

#![allow(dead_code)]

use ai_lib_docproc::transport::CompletionBackend;
use ai_lib_docproc::types::{CompletionRequest, CompletionResponse, TokenUsage};
use ai_lib_docproc::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Backend whose behaviour per task id is set up front.
#[derive(Default)]
pub struct ScriptedBackend {
    latency: Duration,
    failures: Mutex<HashMap<String, u32>>,
    hanging: HashSet<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    dispatched: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The first `times` calls for `task_id` fail with a retryable error.
    pub fn failing(self, task_id: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(task_id.to_string(), times);
        self
    }

    /// Calls for `task_id` never return.
    pub fn hanging(mut self, task_id: &str) -> Self {
        self.hanging.insert(task_id.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Task ids in the order their first attempt started.
    pub fn dispatch_order(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .filter(|id| seen.insert(id.to_string()))
            .cloned()
            .collect()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dispatched.lock().unwrap().push(request.task_id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if self.hanging.contains(&request.task_id) {
            std::future::pending::<()>().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&request.task_id) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            return Err(Error::remote_status(503, "scripted outage"));
        }

        Ok(CompletionResponse::new(
            format!("analysis of {}", request.task_id),
            TokenUsage::new(10, 20),
        ))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
