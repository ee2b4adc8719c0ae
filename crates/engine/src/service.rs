// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform service lifecycle and the startup/shutdown registry

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Lifecycle states of a thread-owning component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Errors from service startup
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service {name} failed to start: {reason}")]
    StartFailed { name: &'static str, reason: String },
}

impl ServiceError {
    pub fn start_failed(name: &'static str, reason: impl Into<String>) -> Self {
        ServiceError::StartFailed {
            name,
            reason: reason.into(),
        }
    }
}

/// The capability set every background component implements: a name, a
/// start, and a cooperative stop.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;
    async fn start(&self) -> Result<(), ServiceError>;
    async fn stop(&self);
}

/// Starts services in declared dependency order and stops them in reverse.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<Arc<dyn Service>>,
    states: Mutex<HashMap<&'static str, ServiceState>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service; registration order is start order.
    pub fn register(&mut self, service: Arc<dyn Service>) {
        self.states
            .lock()
            .insert(service.name(), ServiceState::Stopped);
        self.services.push(service);
    }

    pub fn state(&self, name: &str) -> ServiceState {
        self.states
            .lock()
            .get(name)
            .copied()
            .unwrap_or(ServiceState::Stopped)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    /// Start everything in order. Already-running services are skipped; a
    /// failure stops the services that did start, in reverse, and
    /// propagates.
    pub async fn start_all(&self) -> Result<(), ServiceError> {
        let mut started = Vec::new();
        for service in &self.services {
            let name = service.name();
            if self.state(name) != ServiceState::Stopped {
                continue;
            }
            self.set_state(name, ServiceState::Starting);
            match service.start().await {
                Ok(()) => {
                    self.set_state(name, ServiceState::Running);
                    info!(service = name, "started");
                    started.push(service.clone());
                }
                Err(err) => {
                    error!(service = name, error = %err, "start failed; rolling back");
                    self.set_state(name, ServiceState::Stopped);
                    for service in started.iter().rev() {
                        self.stop_one(service).await;
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Stop everything in reverse registration order.
    pub async fn stop_all(&self) {
        for service in self.services.iter().rev() {
            if self.state(service.name()) == ServiceState::Running {
                self.stop_one(service).await;
            }
        }
    }

    async fn stop_one(&self, service: &Arc<dyn Service>) {
        let name = service.name();
        self.set_state(name, ServiceState::Stopping);
        service.stop().await;
        self.set_state(name, ServiceState::Stopped);
        info!(service = name, "stopped");
    }

    fn set_state(&self, name: &'static str, state: ServiceState) {
        self.states.lock().insert(name, state);
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
