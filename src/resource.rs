//! Metering API proxy.
//!
//! Lists the caller's datasources, then fetches readings for the first
//! measure of the first meter over a fixed date window.

use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::Error;

/// Resource fetch failures, rendered as `{error, details?}`
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Transport error or non-success response
    #[error("Error fetching data from data server")]
    Fetch(#[source] Error),

    /// Listing carried no `data` array, or an empty one
    #[error("No meter data available")]
    NoMeterData,

    /// First meter has no `availableMeasures`
    #[error("No available measures for meter")]
    NoMeasures,

    /// First meter has no usable `id`
    #[error("Meter has no id")]
    MissingMeterId,
}

impl ResourceError {
    /// Upstream detail text, when there is any
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            Self::Fetch(source) => Some(source.details()),
            Self::NoMeterData | Self::NoMeasures | Self::MissingMeterId => None,
        }
    }
}

impl From<Error> for ResourceError {
    fn from(source: Error) -> Self {
        Self::Fetch(source)
    }
}

/// Client for the protected metering API
#[derive(Clone)]
pub struct ResourceProxy {
    client: Client,
    base: Url,
    from: String,
    to: String,
}

impl ResourceProxy {
    /// Proxy against `base` (only its origin is used) for a reading window
    #[must_use]
    pub fn new(client: Client, base: Url, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            client,
            base,
            from: from.into(),
            to: to.into(),
        }
    }

    /// Fetch the meter listing and readings for the first meter's first
    /// measure. Returns `{meterData, data}`.
    ///
    /// # Errors
    ///
    /// See [`ResourceError`].
    pub async fn fetch_meter_readings(&self, access_token: &str) -> Result<Value, ResourceError> {
        let listing_url = self.base.join("/datasources/").map_err(Error::from)?;
        let meter_data = self
            .get_json("Datasource listing failed", listing_url, access_token)
            .await?;

        let meters = meter_data
            .get("data")
            .and_then(Value::as_array)
            .filter(|meters| !meters.is_empty())
            .ok_or(ResourceError::NoMeterData)?;
        info!(meters = meters.len(), "Meter listing received");

        let first = &meters[0];
        let measure = first
            .get("availableMeasures")
            .and_then(Value::as_array)
            .and_then(|measures| measures.first())
            .map(path_segment)
            .ok_or(ResourceError::NoMeasures)?;
        let meter_id = meter_id(first)?;

        let readings_url = self.readings_url(&meter_id, &measure)?;
        debug!(meter_id = %meter_id, measure = %measure, "Fetching meter readings");
        let data = self
            .get_json("Meter readings request failed", readings_url, access_token)
            .await?;

        Ok(json!({ "meterData": meter_data, "data": data }))
    }

    fn readings_url(&self, meter_id: &str, measure: &str) -> Result<Url, ResourceError> {
        let mut url = self.base.join("/datasources/").map_err(Error::from)?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("Resource URL cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .push(meter_id)
            .push(measure);
        url.query_pairs_mut()
            .append_pair("from", &self.from)
            .append_pair("to", &self.to);
        Ok(url)
    }

    async fn get_json(&self, context: &'static str, url: Url, access_token: &str) -> Result<Value, Error> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::upstream(context, response).await);
        }
        Ok(response.json().await?)
    }
}

/// Non-empty `id` of a listed meter
fn meter_id(meter: &Value) -> Result<String, ResourceError> {
    meter
        .get("id")
        .filter(|id| !id.is_null())
        .map(path_segment)
        .filter(|id| !id.is_empty())
        .ok_or(ResourceError::MissingMeterId)
}

/// Render a JSON id or measure as a URL path segment
fn path_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
