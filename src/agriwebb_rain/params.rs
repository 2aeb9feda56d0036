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

use std::collections::HashMap;
use std::env;
use std::error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    NotFound(String),
    AccessDenied(String),
    Other(String, String),
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "parameter '{}' not found", name),
            Self::AccessDenied(name) => write!(f, "access denied to parameter '{}'", name),
            Self::Other(name, reason) => write!(f, "error retrieving parameter '{}': {}", name, reason),
        }
    }
}

impl error::Error for ParameterError {}

/// Source of secret configuration values, looked up by logical name.
pub trait ParameterStore {
    fn get(&self, name: &str) -> Result<String, ParameterError>;
}

/// Logical names of every parameter a single run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterNames {
    pub tempest_token: String,
    pub tempest_station_id: String,
    pub agriwebb_access_token: String,
    pub agriwebb_farm_id: String,
}

impl Default for ParameterNames {
    fn default() -> Self {
        ParameterNames {
            tempest_token: "bonesranch.agriwebb-rain.tempest.token".to_owned(),
            tempest_station_id: "bonesranch.agriwebb-rain.tempest.station_id".to_owned(),
            agriwebb_access_token: "bonesranch.agriwebb-rain.agriwebb.access_token".to_owned(),
            agriwebb_farm_id: "bonesranch.agriwebb-rain.agriwebb.farm_id".to_owned(),
        }
    }
}

/// Parameter store backed by environment variables.
///
/// Parameter names are mapped to variable names by upper-casing them and
/// replacing anything that isn't alphanumeric with an underscore, so
/// `bonesranch.agriwebb-rain.tempest.token` is read from
/// `BONESRANCH_AGRIWEBB_RAIN_TEMPEST_TOKEN`.
#[derive(Debug, Default, Clone)]
pub struct EnvParameterStore;

impl EnvParameterStore {
    pub fn new() -> Self {
        EnvParameterStore
    }

    pub fn variable_name(name: &str) -> String {
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl ParameterStore for EnvParameterStore {
    fn get(&self, name: &str) -> Result<String, ParameterError> {
        let var = Self::variable_name(name);
        match env::var(&var) {
            Ok(v) => {
                tracing::info!(message = "retrieved parameter", parameter = %name, variable = %var);
                Ok(v)
            }
            Err(env::VarError::NotPresent) => Err(ParameterError::NotFound(name.to_owned())),
            Err(e @ env::VarError::NotUnicode(_)) => Err(ParameterError::Other(name.to_owned(), e.to_string())),
        }
    }
}

/// Parameter store holding a fixed set of values.
#[derive(Debug, Default, Clone)]
pub struct StaticParameterStore {
    values: HashMap<String, String>,
    denied: Vec<String>,
}

impl StaticParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Mark a parameter as unreadable: lookups of it fail with `AccessDenied`.
    pub fn deny<K: Into<String>>(mut self, name: K) -> Self {
        self.denied.push(name.into());
        self
    }
}

impl ParameterStore for StaticParameterStore {
    fn get(&self, name: &str) -> Result<String, ParameterError> {
        if self.denied.iter().any(|d| d == name) {
            return Err(ParameterError::AccessDenied(name.to_owned()));
        }

        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ParameterError::NotFound(name.to_owned()))
    }
}
