// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities shared by the daemon gateway and its tooling: command-line
//! error reporting and logging configuration.

pub mod cmd;
pub mod logging;

