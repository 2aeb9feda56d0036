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

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

pub const TEMPEST_TOKEN: &str = "tempest-token";
pub const STATION_ID: &str = "12345";
pub const AGRIWEBB_KEY: &str = "agriwebb-key";
pub const FARM_ID: &str = "farm-1";

/// Serve a router on an ephemeral local port in the background.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service());
    tokio::spawn(server);
    addr
}

/// What a stub Tempest API responds with.
#[derive(Debug, Clone)]
pub enum TempestReply {
    Json(Value),
    Raw(StatusCode, String),
}

#[derive(Debug)]
pub struct TempestState {
    pub reply: TempestReply,
    pub requests: Vec<(String, HashMap<String, String>)>,
}

pub type SharedTempest = Arc<Mutex<TempestState>>;

async fn tempest_observations(
    State(state): State<SharedTempest>,
    Path(station): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.requests.push((station, params));
    match state.reply.clone() {
        TempestReply::Json(v) => Json(v).into_response(),
        TempestReply::Raw(status, body) => (status, body).into_response(),
    }
}

/// Start a stub Tempest API, returning its base URL.
pub async fn tempest(reply: TempestReply) -> (String, SharedTempest) {
    let state = Arc::new(Mutex::new(TempestState {
        reply,
        requests: Vec::new(),
    }));

    let app = Router::new()
        .route("/swd/rest/observations/station/:station", get(tempest_observations))
        .with_state(state.clone());

    let addr = serve(app).await;
    (format!("http://{}/swd/rest", addr), state)
}

#[derive(Debug, Default)]
pub struct FarmState {
    /// IDs of rain gauges that lookups return.
    pub gauges: Vec<(String, String)>,
    /// Whether creating a gauge makes it visible to later lookups.
    pub create_adds_gauge: bool,
    /// Errors to include in `addRainfalls` responses.
    pub rainfall_errors: Vec<Value>,
    pub lookups: usize,
    pub creates: usize,
    pub rainfalls: Vec<String>,
    pub enum_queries: usize,
    pub api_keys: Vec<String>,
}

pub type SharedFarm = Arc<Mutex<FarmState>>;

async fn graphql(State(state): State<SharedFarm>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    let key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    state.api_keys.push(key.clone());

    if key != AGRIWEBB_KEY {
        return (StatusCode::UNAUTHORIZED, "bad api key").into_response();
    }

    let query = body["query"].as_str().unwrap_or_default().to_owned();
    let res = if query.contains("addMapFeatures") {
        state.creates += 1;
        if state.create_adds_gauge {
            let id = format!("gauge-{}", state.creates);
            state.gauges.push((id.clone(), "Tempest".to_owned()));
        }
        json!({"data": {"addMapFeatures": {"mapFeatures": [{"id": "ignored"}]}}})
    } else if query.contains("mapFeatures(") {
        state.lookups += 1;
        let features: Vec<Value> = state
            .gauges
            .iter()
            .map(|(id, name)| json!({"id": id, "name": name, "type": "RAIN_GAUGE", "farmId": FARM_ID}))
            .collect();
        json!({"data": {"mapFeatures": features}})
    } else if query.contains("addRainfalls") {
        state.rainfalls.push(query.clone());
        if state.rainfall_errors.is_empty() {
            json!({"data": {"addRainfalls": {"rainfalls": [{"time": 1709164800000i64, "mode": "cumulative"}]}}})
        } else {
            json!({"data": null, "errors": state.rainfall_errors.clone()})
        }
    } else if query.contains("__type") {
        state.enum_queries += 1;
        json!({"data": {"__type": {"enumValues": [{"name": "RAIN_GAUGE"}, {"name": "WATER_POINT"}]}}})
    } else {
        json!({"errors": [{"message": format!("unknown query: {}", query)}]})
    };

    Json(res).into_response()
}

/// Start a stub AgriWebb GraphQL API, returning its URL.
pub async fn agriwebb(state: FarmState) -> (String, SharedFarm) {
    let state = Arc::new(Mutex::new(state));
    let app = Router::new().route("/v2", post(graphql)).with_state(state.clone());
    let addr = serve(app).await;
    (format!("http://{}/v2", addr), state)
}
