//! Shared probes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use resilience_core::health::HealthProbe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Probe whose verdict is flipped from the test and which counts its invocations
#[derive(Debug)]
pub struct SwitchProbe {
    up: AtomicBool,
    calls: AtomicUsize,
}

impl SwitchProbe {
    pub fn new(up: bool) -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(up),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for SwitchProbe {
    async fn check(&self) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.up.load(Ordering::SeqCst))
    }
}

/// Operation error used with the breakers
pub fn io_error(message: &str) -> std::io::Error {
    std::io::Error::other(message.to_string())
}
