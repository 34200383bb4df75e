//! Actor-based scheduling
//!
//! The scheduler runs as an independent async task and is controlled through
//! a [`SchedulerHandle`](scheduler::SchedulerHandle).
//!
//! ## Architecture Overview
//!
//! ```text
//!      ┌────────────────┐  TickNow / Shutdown   ┌─────────────────┐
//!      │ SchedulerHandle│ ────────────────────► │ SchedulerActor  │
//!      └────────────────┘         (mpsc)        └────────┬────────┘
//!                                                        │ one iteration at a time
//!                                               ┌────────▼────────┐
//!                                               │ Semaphore pool  │ (width N, FIFO)
//!                                               └────────┬────────┘
//!                                  ┌─────────────────────┼─────────────────────┐
//!                           ┌──────▼──────┐       ┌──────▼──────┐       ┌──────▼──────┐
//!                           │  run_cycle  │       │  run_cycle  │       │  run_cycle  │
//!                           └──────┬──────┘       └──────┬──────┘       └──────┬──────┘
//!                                  └─────────────────────┼─────────────────────┘
//!                                              ┌─────────▼─────────┐
//!                                              │ Broadcast Channel │ (CheckEvent)
//!                                              └───────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: mpsc command channel for control messages
//! 2. **Events**: recorded checks are published to a broadcast channel
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod cycle;
pub mod messages;
pub mod scheduler;
