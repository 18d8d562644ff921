//! Actor-based monitoring system
//!
//! A single scheduler actor owns the alert tracker and is the only writer of
//! the snapshot cache. It runs as an independent async task and is driven by
//! a timer and by commands sent through its [`SchedulerHandle`].
//!
//! ```text
//!   tick / PollNow
//!        │
//!        ▼
//!   registry ──► collector × N (join_all) ──► SnapshotStore ──► storage
//!                                                  │
//!                                        classify + tracker
//!                                                  │
//!                                                  ▼
//!                                     dispatcher (one batch per cycle)
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for replies
//! 3. **Shared reads**: readers go through the `SnapshotStore` and never
//!    wait for the actor
//!
//! [`SchedulerHandle`]: scheduler::SchedulerHandle

pub mod messages;
pub mod scheduler;

pub use messages::{CycleReport, SchedulerCommand};
pub use scheduler::{MonitorContext, PollScheduler, SchedulerHandle, SchedulerSettings};
