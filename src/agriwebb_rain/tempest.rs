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

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    Unexpected(StatusCode, Url),
    Decode(serde_json::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(u) => write!(f, "invalid Tempest API URL {}", u),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::Decode(e) => write!(f, "unable to decode Tempest response: {}", e),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

/// A single UTC calendar day, as a half open `[start, end)` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationWindow {
    day: NaiveDate,
}

impl ObservationWindow {
    pub fn for_day(day: NaiveDate) -> Self {
        ObservationWindow { day }
    }

    /// Window covering the UTC calendar day before the one `now` falls in.
    pub fn previous_day(now: DateTime<Utc>) -> Self {
        Self::for_day(now.date_naive() - Duration::days(1))
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.day.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start() + Duration::days(1)
    }

    /// Start of the window as UNIX epoch milliseconds.
    pub fn start_millis(&self) -> i64 {
        self.start().timestamp_millis()
    }
}

/// A single observation along with a best-effort timestamp for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRecord {
    pub timestamp: Option<i64>,
    pub observation: Value,
}

impl ObservationRecord {
    /// Build a record from an observation encoded as either an array (timestamp
    /// first) or an object (`timestamp`, `time`, or `ts` key).
    ///
    /// Empty arrays yield `Ok(None)`, anything else that isn't an array or an
    /// object is an error.
    pub fn from_value(obs: &Value) -> Result<Option<Self>, String> {
        match obs {
            Value::Array(fields) => Ok(fields.first().map(|ts| ObservationRecord {
                timestamp: as_timestamp(ts),
                observation: obs.clone(),
            })),
            Value::Object(fields) => {
                let timestamp = ["timestamp", "time", "ts"]
                    .iter()
                    .filter_map(|k| fields.get(*k))
                    .find_map(as_timestamp);

                Ok(Some(ObservationRecord {
                    timestamp,
                    observation: obs.clone(),
                }))
            }
            other => Err(format!("unexpected observation format: {}", json_type(other))),
        }
    }
}

fn as_timestamp(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalized observations for a station along with the raw response they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct StationObservations {
    pub observations: Vec<ObservationRecord>,
    pub response: Value,
}

impl StationObservations {
    pub fn from_response(response: Value) -> Self {
        let raw: &[Value] = match &response {
            Value::Object(m) => m.get("obs").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]),
            Value::Array(a) => a.as_slice(),
            _ => &[],
        };

        tracing::info!(message = "found observations in response", count = raw.len());

        let mut observations = Vec::with_capacity(raw.len());
        for (idx, obs) in raw.iter().enumerate() {
            match ObservationRecord::from_value(obs) {
                Ok(Some(rec)) => observations.push(rec),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(message = "skipping observation", index = idx, error = %e);
                }
            }
        }

        StationObservations { observations, response }
    }
}

#[derive(Debug)]
pub struct TempestClient {
    client: Client,
    base_url: Url,
}

impl TempestClient {
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|_| ClientError::InvalidUrl(base_url.to_owned()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        Ok(TempestClient { client, base_url })
    }

    /// Fetch all observations for a station within the given window.
    pub async fn observations(
        &self,
        token: &str,
        station: &str,
        window: &ObservationWindow,
    ) -> Result<StationObservations, ClientError> {
        let request_url = self.observations_url(station);
        tracing::info!(
            message = "making station observations request",
            url = %request_url,
            start = %window.start().to_rfc3339(),
            end = %window.end().to_rfc3339(),
        );

        let res = self
            .client
            .get(request_url.clone())
            .query(&[
                ("token", token.to_owned()),
                ("time_start", window.start().timestamp().to_string()),
                ("time_end", window.end().timestamp().to_string()),
            ])
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            // Request URLs include the API token
            .map_err(|e| ClientError::Internal(e.without_url()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(message = "unexpected Tempest response", status = %status, body = %body);
            return Err(ClientError::Unexpected(status, request_url));
        }

        tracing::info!(message = "Tempest API response", status = %status);
        let bytes = res.bytes().await.map_err(|e| ClientError::Internal(e.without_url()))?;
        let data: Value = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!(message = "error parsing Tempest response", error = %e);
            ClientError::Decode(e)
        })?;

        Ok(StationObservations::from_response(data))
    }

    fn observations_url(&self, station: &str) -> Url {
        let mut url = self.base_url.clone();
        // Segments pushed here are percent-encoded by `Url`
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().push("observations").push("station").push(station);
        }

        url
    }
}

#[cfg(test)]
mod tests {
    use super::{ObservationRecord, ObservationWindow, StationObservations, TempestClient};
    use chrono::{NaiveDate, TimeZone, Utc};
    use reqwest::Client;
    use serde_json::json;

    #[test]
    fn test_previous_day_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap();
        let window = ObservationWindow::previous_day(now);

        assert_eq!(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(), window.day());
        assert_eq!(1709164800, window.start().timestamp());
        assert_eq!(1709251200, window.end().timestamp());
        assert_eq!(1709164800000, window.start_millis());
    }

    #[test]
    fn test_previous_day_window_year_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 23, 59, 59).unwrap();
        let window = ObservationWindow::previous_day(now);

        assert_eq!(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(), window.day());
        assert_eq!(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(), window.end());
    }

    #[test]
    fn test_record_from_array() {
        let rec = ObservationRecord::from_value(&json!([1700000000, 10.5, 0.2])).unwrap().unwrap();
        assert_eq!(Some(1700000000), rec.timestamp);

        assert_eq!(None, ObservationRecord::from_value(&json!([])).unwrap());
    }

    #[test]
    fn test_record_from_object() {
        let rec = ObservationRecord::from_value(&json!({"time": 1700000000, "air_temperature": 3.0}))
            .unwrap()
            .unwrap();
        assert_eq!(Some(1700000000), rec.timestamp);

        let rec = ObservationRecord::from_value(&json!({"air_temperature": 3.0})).unwrap().unwrap();
        assert_eq!(None, rec.timestamp);
    }

    #[test]
    fn test_record_from_scalar() {
        assert!(ObservationRecord::from_value(&json!(42)).is_err());
    }

    #[test]
    fn test_station_observations_skips_bad_entries() {
        let res = json!({
            "obs": [[1700000000, 1.0], "garbage", [], {"timestamp": 1700000060}],
        });

        let obs = StationObservations::from_response(res.clone());
        assert_eq!(2, obs.observations.len());
        assert_eq!(Some(1700000060), obs.observations[1].timestamp);
        assert_eq!(res, obs.response);
    }

    #[test]
    fn test_station_observations_top_level_array() {
        let obs = StationObservations::from_response(json!([[1700000000, 1.0]]));
        assert_eq!(1, obs.observations.len());
    }

    #[test]
    fn test_observations_url() {
        let client = TempestClient::new(Client::new(), "https://swd.weatherflow.com/swd/rest").unwrap();
        assert_eq!(
            "https://swd.weatherflow.com/swd/rest/observations/station/12345",
            client.observations_url("12345").as_str()
        );

        let client = TempestClient::new(Client::new(), "https://swd.weatherflow.com/swd/rest/").unwrap();
        assert_eq!(
            "https://swd.weatherflow.com/swd/rest/observations/station/12345",
            client.observations_url("12345").as_str()
        );
    }
}
