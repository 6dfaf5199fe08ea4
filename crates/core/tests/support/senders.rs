//! Scripted `MessageSender` implementations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::MessageSender;
use courier_domain::{DeliveryError, QueueItem};
use parking_lot::Mutex;
use tokio::time::Instant;

/// What the sender should do for a given id on a given attempt.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    FailTransient,
    FailPermanent,
}

/// Records every attempt and follows a per-id script.
///
/// Ids without a script succeed. Once a script runs out the last step
/// repeats.
#[derive(Default)]
pub struct ScriptedSender {
    scripts: Mutex<HashMap<String, Vec<Script>>>,
    attempts: Mutex<Vec<(String, Instant)>>,
    delay: Option<Duration>,
}

impl ScriptedSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send sleeps for `delay` before resolving.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn script(self, id: &str, steps: Vec<Script>) -> Self {
        self.scripts.lock().insert(id.to_string(), steps);
        self
    }

    pub fn always_failing(self, id: &str) -> Self {
        self.script(id, vec![Script::FailTransient])
    }

    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.attempts.lock().clone()
    }

    pub fn attempts_for(&self, id: &str) -> Vec<Instant> {
        self.attempts.lock().iter().filter(|(seen, _)| seen == id).map(|(_, at)| *at).collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn into_dyn(self: Arc<Self>) -> Arc<dyn MessageSender> {
        self
    }

    fn next_step(&self, id: &str, attempt: usize) -> Script {
        let scripts = self.scripts.lock();
        scripts
            .get(id)
            .and_then(|steps| steps.get(attempt).or_else(|| steps.last()))
            .cloned()
            .unwrap_or(Script::Succeed)
    }
}

#[async_trait]
impl MessageSender for ScriptedSender {
    async fn send(&self, item: &QueueItem) -> Result<(), DeliveryError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let previous = attempts.iter().filter(|(seen, _)| seen == &item.id).count();
            attempts.push((item.id.clone(), Instant::now()));
            previous
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_step(&item.id, attempt) {
            Script::Succeed => Ok(()),
            Script::FailTransient => Err(DeliveryError::transient("503 service unavailable")),
            Script::FailPermanent => Err(DeliveryError::permanent("400 invalid payload")),
        }
    }
}
