// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pk-engine: Event bus, load-adaptive scheduling, and the copy pipeline

pub mod bus;
pub mod copy;
pub mod limiter;
pub mod load;
pub mod pool;
pub mod probe;
pub mod scheduler;
pub mod service;

pub use bus::{
    DispatchHandle, EventBus, EventFilter, HandlerError, HandlerResult, SubscriberResult,
    Subscription,
};
pub use copy::CopyEngine;
pub use limiter::{AcquireError, RateLimiter};
pub use load::{LoadEvaluator, LoadProbe, LoadProbeError, LoadWeights, PoolMetrics};
pub use pool::{PoolConfig, PoolJob, RejectedJob, WorkerPool};
pub use probe::SpeedProbe;
pub use scheduler::{priority_for, Scheduler, SchedulerError, SubmitRejected, TaskSink};
pub use service::{Service, ServiceError, ServiceRegistry, ServiceState};
