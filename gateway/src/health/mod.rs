// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Daemon liveness tracking

mod monitor;
mod registry;

pub use monitor::HealthMonitor;
pub use monitor::MonitorStatus;
pub use monitor::SkipReason;
pub use monitor::SweepOutcome;
pub use registry::DaemonDelay;
pub use registry::DaemonRegistry;
