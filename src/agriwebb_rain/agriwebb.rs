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

use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    Unexpected(StatusCode, Url),
    Decode(serde_json::Error),
    GraphQl(Vec<String>),
    MissingData(&'static str),
    SensorNotFound(String),
}

impl ClientError {
    /// True if this error means the farm isn't set up the way we need it to be
    /// rather than a transient or API failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::SensorNotFound(_))
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(u) => write!(f, "invalid AgriWebb API URL {}", u),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::Decode(e) => write!(f, "unable to decode AgriWebb response: {}", e),
            Self::GraphQl(messages) => write!(f, "GraphQL errors: {}", messages.join(", ")),
            Self::MissingData(field) => write!(f, "AgriWebb response missing {}", field),
            Self::SensorNotFound(name) => write!(f, "rain gauge sensor ID not found for name: {}", name),
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

/// The rain gauge sensor that rainfall readings are recorded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RainGauge {
    /// Display name used when creating the gauge and preferred when several exist.
    pub name: String,
    /// `MapFeatureType` enum value for rain gauges.
    pub type_tag: String,
    /// `RainfallUnit` enum value of submitted readings.
    pub unit: String,
    /// `RainfallMode` enum value of submitted readings.
    pub mode: String,
}

impl Default for RainGauge {
    fn default() -> Self {
        RainGauge {
            name: "Tempest".to_owned(),
            type_tag: "RAIN_GAUGE".to_owned(),
            unit: "inch".to_owned(),
            mode: "cumulative".to_owned(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<Value>>,
}

/// Messages from a GraphQL `errors` list. Entries without a `message` are
/// rendered as JSON.
fn error_messages(errors: &[Value]) -> Vec<String> {
    errors
        .iter()
        .map(|e| match e.get("message").and_then(Value::as_str) {
            Some(m) => m.to_owned(),
            None => e.to_string(),
        })
        .collect()
}

/// Quote and escape a value for use as a GraphQL string literal.
fn quote(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}

#[derive(Deserialize, Debug)]
struct TypeData {
    #[serde(rename = "__type")]
    type_: Option<EnumType>,
}

#[derive(Deserialize, Debug)]
struct EnumType {
    #[serde(rename = "enumValues")]
    enum_values: Option<Vec<EnumValue>>,
}

#[derive(Deserialize, Debug)]
struct EnumValue {
    name: String,
}

#[derive(Deserialize, Debug)]
struct MapFeaturesData {
    #[serde(rename = "mapFeatures")]
    map_features: Option<Vec<MapFeature>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MapFeature {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    #[serde(rename = "farmId")]
    pub farm_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AddRainfallsData {
    #[serde(rename = "addRainfalls")]
    add_rainfalls: Option<AddRainfallsPayload>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AddRainfallsPayload {
    #[serde(default)]
    pub rainfalls: Vec<Rainfall>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Rainfall {
    pub time: Option<i64>,
    pub mode: Option<String>,
}

/// Result of recording a rainfall reading.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RainfallUpdate {
    pub sensor_id: String,
    pub rainfalls: Vec<Rainfall>,
}

fn enum_values_query(enum_name: &str) -> String {
    format!("{{ __type(name: {}) {{ enumValues {{ name }} }} }}", quote(enum_name))
}

fn map_features_query(gauge: &RainGauge, farm_id: &str) -> String {
    format!(
        "{{ mapFeatures(filter: {{ type: {{ _eq: {} }} farmId: {{ _eq: {} }} }}) {{ id name type farmId }} }}",
        gauge.type_tag,
        quote(farm_id),
    )
}

fn add_map_feature_mutation(gauge: &RainGauge, farm_id: &str) -> String {
    format!(
        "mutation {{ addMapFeatures(input: [{{ farmId: {} name: {} type: {} }}]) {{ mapFeatures {{ id }} }} }}",
        quote(farm_id),
        quote(&gauge.name),
        gauge.type_tag,
    )
}

fn add_rainfalls_mutation(gauge: &RainGauge, farm_id: &str, sensor_id: &str, inches: f64, time_ms: i64) -> String {
    format!(
        "mutation {{ addRainfalls(input: {{ farmId: {} sensorId: {} value: {:.2} unit: {} mode: {} time: {} }}) {{ rainfalls {{ time mode }} }} }}",
        quote(farm_id),
        quote(sensor_id),
        inches,
        gauge.unit,
        gauge.mode,
        time_ms,
    )
}

/// Pick the rain gauge to use out of the features returned by a lookup: the
/// first one with the expected name, otherwise the first one.
fn select_feature<'a>(features: &'a [MapFeature], name: &str) -> Option<&'a MapFeature> {
    features
        .iter()
        .find(|f| f.name.as_deref() == Some(name))
        .or_else(|| features.first())
}

/// Client for the AgriWebb GraphQL API.
#[derive(Debug)]
pub struct AgriWebbClient {
    client: Client,
    url: Url,
    gauge: RainGauge,
}

impl AgriWebbClient {
    const API_KEY: &'static str = "x-api-key";
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, url: &str, gauge: RainGauge) -> Result<Self, ClientError> {
        let url = Url::parse(url).map_err(|_| ClientError::InvalidUrl(url.to_owned()))?;
        Ok(AgriWebbClient { client, url, gauge })
    }

    /// Fetch the names of each value of a GraphQL enum type. Only used for
    /// diagnosing what values the API will accept.
    pub async fn enum_values(&self, token: &str, enum_name: &str) -> Result<Vec<String>, ClientError> {
        tracing::info!(message = "fetching enum values", enum_name = %enum_name);
        let data: TypeData = self.execute(token, enum_values_query(enum_name)).await?;
        let values: Vec<String> = data
            .type_
            .and_then(|t| t.enum_values)
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.name)
            .collect();

        tracing::info!(message = "enum values", enum_name = %enum_name, values = ?values);
        Ok(values)
    }

    /// Find the ID of the rain gauge for a farm, if there is one.
    pub async fn rain_gauge_id(&self, token: &str, farm_id: &str) -> Result<Option<String>, ClientError> {
        tracing::info!(message = "getting rain gauge sensor ID", farm_id = %farm_id);
        let data: MapFeaturesData = self.execute(token, map_features_query(&self.gauge, farm_id)).await?;
        let features = data.map_features.unwrap_or_default();

        Ok(select_feature(&features, &self.gauge.name).map(|f| f.id.clone()))
    }

    /// Create a rain gauge for a farm.
    pub async fn create_rain_gauge(&self, token: &str, farm_id: &str) -> Result<(), ClientError> {
        tracing::info!(message = "creating rain gauge", farm_id = %farm_id, name = %self.gauge.name);
        let data: Value = self.execute(token, add_map_feature_mutation(&self.gauge, farm_id)).await?;
        tracing::debug!(message = "created rain gauge", response = %data);
        Ok(())
    }

    /// Find the ID of the rain gauge for a farm, creating the gauge if it doesn't exist.
    ///
    /// Creation is attempted at most once. If the gauge still can't be found after
    /// being created, `ClientError::SensorNotFound` is returned.
    pub async fn resolve_rain_gauge(&self, token: &str, farm_id: &str) -> Result<String, ClientError> {
        if let Some(id) = self.rain_gauge_id(token, farm_id).await? {
            return Ok(id);
        }

        tracing::info!(message = "rain gauge not found, creating a new one", name = %self.gauge.name);
        self.create_rain_gauge(token, farm_id).await?;

        match self.rain_gauge_id(token, farm_id).await? {
            Some(id) => Ok(id),
            None => {
                tracing::error!(message = "rain gauge not found after creation", name = %self.gauge.name);
                Err(ClientError::SensorNotFound(self.gauge.name.clone()))
            }
        }
    }

    /// Record a rainfall reading, in the gauge's unit, against a specific sensor.
    pub async fn add_rainfall(
        &self,
        token: &str,
        farm_id: &str,
        sensor_id: &str,
        value: f64,
        time_ms: i64,
    ) -> Result<AddRainfallsPayload, ClientError> {
        tracing::info!(message = "updating AgriWebb rainfall", value = value, unit = %self.gauge.unit, time_ms = time_ms);
        let data: AddRainfallsData = self
            .execute(token, add_rainfalls_mutation(&self.gauge, farm_id, sensor_id, value, time_ms))
            .await?;

        let payload = data.add_rainfalls.ok_or(ClientError::MissingData("addRainfalls"))?;
        tracing::info!(message = "updated AgriWebb rainfall record", rainfalls = payload.rainfalls.len());
        Ok(payload)
    }

    /// Resolve the farm's rain gauge and record a rainfall reading against it.
    pub async fn update_rainfall(
        &self,
        token: &str,
        farm_id: &str,
        value: f64,
        time_ms: i64,
    ) -> Result<RainfallUpdate, ClientError> {
        let sensor_id = self.resolve_rain_gauge(token, farm_id).await?;
        let payload = self.add_rainfall(token, farm_id, &sensor_id, value, time_ms).await?;

        Ok(RainfallUpdate {
            sensor_id,
            rainfalls: payload.rainfalls,
        })
    }

    async fn execute<T: DeserializeOwned>(&self, token: &str, query: String) -> Result<T, ClientError> {
        tracing::debug!(message = "making GraphQL request", url = %self.url, query = %query);

        let res = self
            .client
            .post(self.url.clone())
            .header(Self::API_KEY, token)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(ClientError::Internal)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(message = "unexpected AgriWebb response", status = %status, body = %body);
            return Err(ClientError::Unexpected(status, self.url.clone()));
        }

        let bytes = res.bytes().await.map_err(ClientError::Internal)?;
        let parsed: GraphQlResponse<T> = serde_json::from_slice(&bytes).map_err(ClientError::Decode)?;
        let errors = parsed.errors.unwrap_or_default();
        if !errors.is_empty() {
            let messages = error_messages(&errors);
            tracing::error!(message = "GraphQL errors", errors = ?messages);
            return Err(ClientError::GraphQl(messages));
        }

        parsed.data.ok_or(ClientError::MissingData("data"))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        add_rainfalls_mutation, error_messages, map_features_query, quote, select_feature, ClientError, MapFeature,
        RainGauge,
    };
    use serde_json::json;

    fn feature(id: &str, name: &str) -> MapFeature {
        MapFeature {
            id: id.to_owned(),
            name: Some(name.to_owned()),
            type_: Some("RAIN_GAUGE".to_owned()),
            farm_id: Some("farm-1".to_owned()),
        }
    }

    #[test]
    fn test_quote() {
        assert_eq!(r#""farm-1""#, quote("farm-1"));
        assert_eq!(r#""a\"b""#, quote("a\"b"));
    }

    #[test]
    fn test_map_features_query() {
        let q = map_features_query(&RainGauge::default(), "farm-1");
        assert!(q.contains(r#"type: { _eq: RAIN_GAUGE }"#));
        assert!(q.contains(r#"farmId: { _eq: "farm-1" }"#));
    }

    #[test]
    fn test_add_rainfalls_mutation() {
        let q = add_rainfalls_mutation(&RainGauge::default(), "farm-1", "sensor-9", 0.126, 1709164800000);
        assert!(q.contains(r#"farmId: "farm-1""#));
        assert!(q.contains(r#"sensorId: "sensor-9""#));
        assert!(q.contains("value: 0.13 "), "{}", q);
        assert!(q.contains("unit: inch "));
        assert!(q.contains("mode: cumulative "));
        assert!(q.contains("time: 1709164800000 "));
    }

    #[test]
    fn test_error_messages() {
        let errors = vec![
            json!({"message": "farm not found"}),
            json!({"extensions": {"code": "FORBIDDEN"}}),
            json!({"message": "bad sensor"}),
        ];

        let messages = error_messages(&errors);
        assert_eq!(3, messages.len());
        assert_eq!("farm not found", messages[0]);
        assert_eq!(r#"{"extensions":{"code":"FORBIDDEN"}}"#, messages[1]);

        let err = ClientError::GraphQl(messages);
        let display = err.to_string();
        assert!(display.contains("farm not found"));
        assert!(display.contains("FORBIDDEN"));
        assert!(display.contains("bad sensor"));
    }

    #[test]
    fn test_select_feature_prefers_name() {
        let features = vec![feature("1", "Back paddock"), feature("2", "Tempest")];
        assert_eq!(Some("2"), select_feature(&features, "Tempest").map(|f| f.id.as_str()));
    }

    #[test]
    fn test_select_feature_first() {
        let features = vec![feature("1", "Back paddock"), feature("2", "Dam")];
        assert_eq!(Some("1"), select_feature(&features, "Tempest").map(|f| f.id.as_str()));
        assert_eq!(None, select_feature(&[], "Tempest"));
    }

    #[test]
    fn test_sensor_not_found_is_configuration() {
        assert!(ClientError::SensorNotFound("Tempest".to_owned()).is_configuration());
        assert!(!ClientError::GraphQl(vec![]).is_configuration());
    }
}
