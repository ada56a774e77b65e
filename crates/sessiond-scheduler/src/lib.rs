// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod error;
mod events;
mod job;
mod schedule;
mod scheduler;

pub use error::{Result, SchedulerError};
pub use events::SchedulerEvent;
pub use job::{RecurringJob, TaskTemplate};
pub use schedule::Schedule;
pub use scheduler::Scheduler;
