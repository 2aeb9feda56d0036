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

use agriwebb_rain::agriwebb::{AgriWebbClient, RainGauge};
use agriwebb_rain::job::{InvocationContext, RainfallJob, ScheduledEvent};
use agriwebb_rain::params::{EnvParameterStore, ParameterNames};
use agriwebb_rain::tempest::TempestClient;
use clap::Parser;
use reqwest::Client;
use std::error::Error;
use std::process;
use std::time::Duration;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_TIMEOUT_MILLIS: u64 = 30_000;
const DEFAULT_TEMPEST_URL: &str = "https://swd.weatherflow.com/swd/rest";
const DEFAULT_AGRIWEBB_URL: &str = "https://api.agriwebb.com/v2";
const DEFAULT_RAIN_GAUGE_NAME: &str = "Tempest";

#[derive(Debug, Parser)]
#[clap(name = "agriwebb_rain", version = clap::crate_version!())]
struct AgriWebbRainApplication {
    /// Base URL for the Tempest REST API
    #[clap(long, default_value_t = DEFAULT_TEMPEST_URL.into())]
    tempest_url: String,

    /// URL of the AgriWebb GraphQL API
    #[clap(long, default_value_t = DEFAULT_AGRIWEBB_URL.into())]
    agriwebb_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for each request made to the Tempest and AgriWebb APIs, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Name of the AgriWebb rain gauge to record rainfall against. Created if the farm
    /// doesn't have a rain gauge yet.
    #[clap(long, default_value_t = DEFAULT_RAIN_GAUGE_NAME.into())]
    rain_gauge_name: String,

    /// Parameter holding the Tempest API token
    #[clap(long, default_value_t = ParameterNames::default().tempest_token)]
    tempest_token_param: String,

    /// Parameter holding the Tempest station ID
    #[clap(long, default_value_t = ParameterNames::default().tempest_station_id)]
    tempest_station_id_param: String,

    /// Parameter holding the AgriWebb API key
    #[clap(long, default_value_t = ParameterNames::default().agriwebb_access_token)]
    agriwebb_access_token_param: String,

    /// Parameter holding the AgriWebb farm ID
    #[clap(long, default_value_t = ParameterNames::default().agriwebb_farm_id)]
    agriwebb_farm_id_param: String,

    /// Event that triggered this run, as JSON. The 'time' and 'source' fields are logged
    /// and 'time' is included in the result.
    #[clap(long, default_value = "{}")]
    event: String,

    /// ID of this run, included in all log messages
    #[clap(long, default_value = "local")]
    request_id: String,

    /// Log the values of an AgriWebb GraphQL enum type (e.g. 'MapFeatureType') before
    /// running. May be repeated.
    #[clap(long)]
    log_enum: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = AgriWebbRainApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let event: ScheduledEvent = serde_json::from_str(&opts.event).unwrap_or_else(|e| {
        tracing::error!(message = "invalid event JSON", error = %e);
        process::exit(1)
    });

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let tempest = TempestClient::new(http_client.clone(), &opts.tempest_url).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize Tempest client", error = %e);
        process::exit(1)
    });

    let gauge = RainGauge {
        name: opts.rain_gauge_name.clone(),
        ..RainGauge::default()
    };
    let agriwebb = AgriWebbClient::new(http_client, &opts.agriwebb_url, gauge).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize AgriWebb client", error = %e);
        process::exit(1)
    });

    let names = ParameterNames {
        tempest_token: opts.tempest_token_param,
        tempest_station_id: opts.tempest_station_id_param,
        agriwebb_access_token: opts.agriwebb_access_token_param,
        agriwebb_farm_id: opts.agriwebb_farm_id_param,
    };

    let ctx = InvocationContext {
        request_id: opts.request_id,
        ..InvocationContext::default()
    };

    let job = RainfallJob::new(EnvParameterStore::new(), names, tempest, agriwebb);
    if let Err(e) = job.log_enum_values(&opts.log_enum).await {
        tracing::error!(message = "failed to fetch enum values", error = %e);
        process::exit(1)
    }

    match job.run(&event, &ctx).await {
        Ok(res) => {
            println!("{}", serde_json::to_string_pretty(&res)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(message = "run failed", configuration = e.is_configuration(), error = %e);
            process::exit(1)
        }
    }
}
