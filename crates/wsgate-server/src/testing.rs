//! Test doubles shared by the unit tests.

use crate::auth::{TokenVerifier, VerifyError};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use wsgate_core::VerificationRequest;

/// Replays scripted outcomes and records every attempt.
pub struct ScriptedVerifier {
    script: Mutex<VecDeque<Result<(), VerifyError>>>,
    fallback: Result<(), VerifyError>,
    delay: Duration,
    log: Mutex<Vec<(Instant, VerificationRequest)>>,
}

impl ScriptedVerifier {
    /// Outcomes are consumed in order; once exhausted, attempts succeed.
    pub fn new(script: Vec<Result<(), VerifyError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Ok(()),
            delay: Duration::ZERO,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Every attempt yields `outcome`.
    pub fn always(outcome: Result<(), VerifyError>) -> Self {
        Self {
            fallback: outcome,
            ..Self::new(Vec::new())
        }
    }

    /// Each attempt takes `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.log.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn requests(&self) -> Vec<VerificationRequest> {
        self.log.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }
}

impl TokenVerifier for ScriptedVerifier {
    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), VerifyError>> + Send + 'a>> {
        Box::pin(async move {
            self.log
                .lock()
                .unwrap()
                .push((Instant::now(), request.clone()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        })
    }
}
