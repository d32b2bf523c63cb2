//! HTTP car information API backend.
//!
//! Queries `GET <url>?make=<brand>` with an `X-Api-Key` header and formats
//! the first returned model as a single line:
//!
//! ```text
//! CAR INFO: bmw m3 2020, Class: compact car, Engine: 3L, 6cyl, Transmission: m, Drive: rwd
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::{no_data, Lookup, LookupError};
use crate::config::LookupSettings;

/// One model entry from the API response.
#[derive(Debug, Default, Deserialize)]
pub struct CarInfo {
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, deserialize_with = "lenient")]
    pub year: Option<u32>,
    #[serde(default, rename = "class")]
    pub class_name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub displacement: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub cylinders: Option<u32>,
    #[serde(default)]
    pub transmission: String,
    #[serde(default)]
    pub drive: String,
}

/// Numbers may arrive as JSON numbers, numeric strings, or placeholder text.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText<T> {
    Number(T),
    Text(String),
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
{
    Ok(
        match Option::<NumberOrText<T>>::deserialize(deserializer)? {
            Some(NumberOrText::Number(n)) => Some(n),
            Some(NumberOrText::Text(s)) => s.trim().parse().ok(),
            None => None,
        },
    )
}

/// Format a model entry as one response line.
pub fn format_car_info(car: &CarInfo) -> String {
    let year = car.year.map(|y| y.to_string()).unwrap_or_default();
    let mut parts = vec![format!("CAR INFO: {} {} {}", car.make, car.model, year)
        .trim_end()
        .to_string()];

    if !car.class_name.is_empty() {
        parts.push(format!("Class: {}", car.class_name));
    }
    if let Some(displacement) = car.displacement {
        parts.push(format!("Engine: {displacement}L"));
    }
    if let Some(cylinders) = car.cylinders {
        parts.push(format!("{cylinders}cyl"));
    }
    if !car.transmission.is_empty() {
        parts.push(format!("Transmission: {}", car.transmission));
    }
    if !car.drive.is_empty() {
        parts.push(format!("Drive: {}", car.drive));
    }

    parts.join(", ")
}

/// Lookup backed by the HTTP car API.
#[derive(Debug, Clone)]
pub struct CarApi {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl CarApi {
    pub fn new(settings: &LookupSettings) -> Result<Self, LookupError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(LookupError::NotConfigured("car api key is missing"))?;

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout.min(Duration::from_secs(5)))
            .build()?;

        Ok(Self {
            client,
            url: settings.url.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Lookup for CarApi {
    async fn resolve(&self, brand: &str) -> Result<String, LookupError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("make", brand.to_lowercase())])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status));
        }

        let cars: Vec<CarInfo> = response.json().await?;
        debug!(brand, results = cars.len(), "Car API response");

        Ok(match cars.first() {
            Some(car) => format_car_info(car),
            None => no_data(brand),
        })
    }
}
