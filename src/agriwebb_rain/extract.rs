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

use serde_json::{Map, Value};
use std::fmt;

/// Field holding yesterday's accumulated precipitation, in millimeters.
pub const PRECIP_ACCUM_LOCAL_YESTERDAY: &str = "precip_accum_local_yesterday";

/// Where in a Tempest response a value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Summary,
    ObsSummary,
    LatestObservation,
    FieldMap(usize),
    Root,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summary => write!(f, "summary"),
            Self::ObsSummary => write!(f, "obs_summary"),
            Self::LatestObservation => write!(f, "latest observation"),
            Self::FieldMap(idx) => write!(f, "latest observation index {}", idx),
            Self::Root => write!(f, "root level"),
        }
    }
}

type Probe = for<'a> fn(&'a Map<String, Value>, &str) -> Option<(Location, &'a Value)>;

/// Probes in priority order. The first one to find the field wins.
const PROBES: [Probe; 4] = [summary, obs_summary, latest_observation, root];

/// Locates a single numeric field in a Tempest observations response.
///
/// The shape of the response varies between API versions and product tiers so
/// the field is searched for in several places, in order:
///
/// 1. The `summary` object
/// 2. The `obs_summary` object
/// 3. The last element of `obs`, either an object or an array interpreted using
///    the response's `field_map`
/// 4. The top level of the response itself
#[derive(Debug, Clone)]
pub struct RainfallExtractor {
    field: String,
}

impl RainfallExtractor {
    pub fn new<S: Into<String>>(field: S) -> Self {
        RainfallExtractor { field: field.into() }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Find the raw value of the field and where it was found, if present anywhere.
    pub fn locate<'a>(&self, response: &'a Value) -> Option<(Location, &'a Value)> {
        let root = response.as_object()?;
        PROBES.iter().find_map(|probe| probe(root, &self.field))
    }

    /// Return the value of the field as a float or `None` if it could not be found.
    ///
    /// A field that is found but isn't a number (e.g. `null`) is treated the same
    /// as a missing field: later locations are not searched.
    pub fn extract(&self, response: &Value) -> Option<f64> {
        match self.locate(response) {
            Some((location, value)) => match value.as_f64() {
                Some(v) => {
                    tracing::info!(message = "found rainfall value", field = %self.field, location = %location, value = v);
                    Some(v)
                }
                None => {
                    tracing::warn!(message = "rainfall value is not a number", field = %self.field, location = %location, value = %value);
                    None
                }
            },
            None => {
                tracing::warn!(message = "rainfall value not found in response", field = %self.field);
                tracing::debug!(message = "response structure", response = %response);
                None
            }
        }
    }
}

impl Default for RainfallExtractor {
    fn default() -> Self {
        Self::new(PRECIP_ACCUM_LOCAL_YESTERDAY)
    }
}

fn nested<'a>(root: &'a Map<String, Value>, key: &str, field: &str) -> Option<&'a Value> {
    root.get(key)?.as_object()?.get(field)
}

fn summary<'a>(root: &'a Map<String, Value>, field: &str) -> Option<(Location, &'a Value)> {
    nested(root, "summary", field).map(|v| (Location::Summary, v))
}

fn obs_summary<'a>(root: &'a Map<String, Value>, field: &str) -> Option<(Location, &'a Value)> {
    nested(root, "obs_summary", field).map(|v| (Location::ObsSummary, v))
}

fn latest_observation<'a>(root: &'a Map<String, Value>, field: &str) -> Option<(Location, &'a Value)> {
    match root.get("obs")?.as_array()?.last()? {
        Value::Object(obs) => obs.get(field).map(|v| (Location::LatestObservation, v)),
        Value::Array(obs) => {
            let idx = field_index(root.get("field_map")?, field)?;
            obs.get(idx).map(|v| (Location::FieldMap(idx), v))
        }
        _ => None,
    }
}

fn root<'a>(root: &'a Map<String, Value>, field: &str) -> Option<(Location, &'a Value)> {
    root.get(field).map(|v| (Location::Root, v))
}

/// Position of a field in array encoded observations, from either an object of
/// `{"index": "name"}` pairs or an array of names.
fn field_index(field_map: &Value, field: &str) -> Option<usize> {
    match field_map {
        Value::Object(m) => m
            .iter()
            .find(|(_, name)| name.as_str() == Some(field))
            .and_then(|(idx, _)| idx.parse().ok()),
        Value::Array(names) => names.iter().position(|name| name.as_str() == Some(field)),
        _ => None,
    }
}
