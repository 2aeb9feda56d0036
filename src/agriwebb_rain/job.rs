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

use crate::agriwebb::{self, AgriWebbClient};
use crate::extract::RainfallExtractor;
use crate::params::{ParameterError, ParameterNames, ParameterStore};
use crate::tempest::{self, ObservationWindow, TempestClient};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error;
use std::fmt;
use tracing::Instrument;

pub const MM_PER_INCH: f64 = 25.4;

/// Convert millimeters to inches, rounded to three decimal places.
pub fn mm_to_inches(mm: f64) -> f64 {
    (mm / MM_PER_INCH * 1000.0).round() / 1000.0
}

#[derive(Debug)]
pub enum JobError {
    Parameter(ParameterError),
    Weather(tempest::ClientError),
    Farm(agriwebb::ClientError),
}

impl JobError {
    /// True for failures caused by missing or unusable configuration: secrets that
    /// can't be read or a rain gauge that can't be resolved.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Parameter(_) => true,
            Self::Farm(e) => e.is_configuration(),
            Self::Weather(_) => false,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter(e) => write!(f, "configuration error: {}", e),
            Self::Weather(e) => write!(f, "Tempest error: {}", e),
            Self::Farm(e) if e.is_configuration() => write!(f, "configuration error: {}", e),
            Self::Farm(e) => write!(f, "AgriWebb error: {}", e),
        }
    }
}

impl error::Error for JobError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Parameter(e) => Some(e),
            Self::Weather(e) => Some(e),
            Self::Farm(e) => Some(e),
        }
    }
}

impl From<ParameterError> for JobError {
    fn from(e: ParameterError) -> Self {
        Self::Parameter(e)
    }
}

impl From<tempest::ClientError> for JobError {
    fn from(e: tempest::ClientError) -> Self {
        Self::Weather(e)
    }
}

impl From<agriwebb::ClientError> for JobError {
    fn from(e: agriwebb::ClientError) -> Self {
        Self::Farm(e)
    }
}

fn not_available() -> String {
    "N/A".to_owned()
}

/// Event that triggered a run, typically from a scheduler.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    #[serde(default = "not_available")]
    pub time: String,
    #[serde(default = "not_available")]
    pub source: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ScheduledEvent {
    fn default() -> Self {
        ScheduledEvent {
            time: not_available(),
            source: not_available(),
            extra: Map::new(),
        }
    }
}

/// Details about the current invocation, only used for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub function_name: String,
    pub request_id: String,
}

impl Default for InvocationContext {
    fn default() -> Self {
        InvocationContext {
            function_name: "agriwebb_rain".to_owned(),
            request_id: "local".to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    PartialSuccess,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial_success"),
        }
    }
}

/// Outcome of a run that didn't fail.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobResult {
    pub status: Status,
    pub message: String,
    pub event_time: String,
    pub rainfall_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rainfall_inches: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub observations_count: usize,
    pub agriwebb_updated: bool,
}

/// Copies yesterday's rainfall total from a Tempest station to an AgriWebb rain gauge.
#[derive(Debug)]
pub struct RainfallJob<P> {
    params: P,
    names: ParameterNames,
    tempest: TempestClient,
    agriwebb: AgriWebbClient,
    extractor: RainfallExtractor,
}

impl<P> RainfallJob<P>
where
    P: ParameterStore,
{
    pub fn new(params: P, names: ParameterNames, tempest: TempestClient, agriwebb: AgriWebbClient) -> Self {
        RainfallJob {
            params,
            names,
            tempest,
            agriwebb,
            extractor: RainfallExtractor::default(),
        }
    }

    /// Log every value of the named AgriWebb enum types.
    pub async fn log_enum_values(&self, enum_names: &[String]) -> Result<(), JobError> {
        if enum_names.is_empty() {
            return Ok(());
        }

        let token = self.params.get(&self.names.agriwebb_access_token)?;
        for name in enum_names {
            self.agriwebb.enum_values(&token, name).await?;
        }

        Ok(())
    }

    /// Run once for the day before the current UTC date.
    pub async fn run(&self, event: &ScheduledEvent, ctx: &InvocationContext) -> Result<JobResult, JobError> {
        self.run_at(event, ctx, Utc::now()).await
    }

    /// Run once for the day before the UTC date that `now` falls in.
    pub async fn run_at(
        &self,
        event: &ScheduledEvent,
        ctx: &InvocationContext,
        now: DateTime<Utc>,
    ) -> Result<JobResult, JobError> {
        let span = tracing::info_span!("agriwebb_rain", function = %ctx.function_name, request_id = %ctx.request_id);

        async {
            let res = self.execute(event, now).await;
            match &res {
                Ok(r) => tracing::info!(message = "task completed", status = %r.status),
                Err(e) => tracing::error!(message = "error executing job", error = %e),
            }

            res
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, event: &ScheduledEvent, now: DateTime<Utc>) -> Result<JobResult, JobError> {
        tracing::info!(message = "received event", time = %event.time, source = %event.source);

        let token = self.params.get(&self.names.tempest_token)?;
        let station = self.params.get(&self.names.tempest_station_id)?;
        let window = ObservationWindow::previous_day(now);

        tracing::info!(message = "querying Tempest for yesterday's rainfall", station = %station, date = %window.day());
        let observations = self.tempest.observations(&token, &station, &window).await?;
        let count = observations.observations.len();
        tracing::info!(message = "yesterday's observations", count = count);

        let rainfall_mm = match self.extractor.extract(&observations.response) {
            Some(mm) => mm,
            None => {
                tracing::warn!(message = "skipping AgriWebb update, no rainfall data available", field = %self.extractor.field());
                return Ok(JobResult {
                    status: Status::PartialSuccess,
                    message: "Retrieved observations but could not extract rainfall amount".to_owned(),
                    event_time: event.time.clone(),
                    rainfall_mm: None,
                    rainfall_inches: None,
                    date: None,
                    observations_count: count,
                    agriwebb_updated: false,
                });
            }
        };

        let rainfall_inches = mm_to_inches(rainfall_mm);
        let time_ms = window.start_millis();
        tracing::info!(message = "converted rainfall", mm = rainfall_mm, inches = rainfall_inches, time_ms = time_ms);

        let access_token = self.params.get(&self.names.agriwebb_access_token)?;
        let farm_id = self.params.get(&self.names.agriwebb_farm_id)?;

        tracing::info!(message = "updating AgriWebb", inches = rainfall_inches, date = %window.day(), farm_id = %farm_id);
        let update = self
            .agriwebb
            .update_rainfall(&access_token, &farm_id, rainfall_inches, time_ms)
            .await?;
        tracing::info!(message = "updated AgriWebb", sensor_id = %update.sensor_id, rainfalls = ?update.rainfalls);

        Ok(JobResult {
            status: Status::Success,
            message: "Successfully retrieved and updated rainfall data".to_owned(),
            event_time: event.time.clone(),
            rainfall_mm: Some(rainfall_mm),
            rainfall_inches: Some(rainfall_inches),
            date: Some(window.day()),
            observations_count: count,
            agriwebb_updated: true,
        })
    }
}
