// agriwebb_rain - Relay daily Tempest rainfall totals to AgriWebb
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Relay daily Tempest rainfall totals to AgriWebb
//!
//! ## Features
//!
//! `agriwebb_rain` is meant to be run once a day by a scheduler (cron, a systemd timer, or
//! a cloud scheduler). Each run:
//!
//! * Fetches the previous UTC day's observations for a [Tempest] weather station.
//! * Finds the station's accumulated precipitation for that day, in millimeters.
//! * Converts it to inches.
//! * Finds (or creates) the farm's rain gauge in [AgriWebb] and records the rainfall
//!   against it, timestamped at midnight UTC of that day.
//!
//! If the rainfall total can't be found in the Tempest response the run still succeeds
//! but nothing is written to AgriWebb (a "partial success").
//!
//! [Tempest]: https://weatherflow.github.io/Tempest/api/
//! [AgriWebb]: https://docs.agriwebb.com/graphql/
//!
//! ## Build
//!
//! `agriwebb_rain` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Parameters
//!
//! Secrets are read from environment variables named after each parameter: the parameter
//! name upper-cased with anything that isn't a letter or digit replaced by an underscore.
//!
//! ```text
//! export BONESRANCH_AGRIWEBB_RAIN_TEMPEST_TOKEN=...
//! export BONESRANCH_AGRIWEBB_RAIN_TEMPEST_STATION_ID=12345
//! export BONESRANCH_AGRIWEBB_RAIN_AGRIWEBB_ACCESS_TOKEN=...
//! export BONESRANCH_AGRIWEBB_RAIN_AGRIWEBB_FARM_ID=...
//! ```
//!
//! ### Run
//!
//! ```text
//! ./agriwebb_rain --event '{"time": "2024-03-01T06:00:00Z", "source": "cron"}'
//! ```
//!
//! The result of the run is printed to stdout as JSON. Failures are logged and the process
//! exits with a non-zero status.
//!

pub mod agriwebb;
pub mod extract;
pub mod job;
pub mod params;
pub mod tempest;
