//! Navigation boundary
//!
//! Location acquisition and the map surface seam. Map rendering itself is
//! external; this module only supplies coordinates to the session setup and
//! the coordinate-only fallback when the map cannot be shown.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A geographic fix
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
}

/// Single-shot location source
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Acquire the current position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Location`] when no fix can be obtained; callers treat
    /// this as best-effort and proceed without a location.
    async fn locate(&self) -> Result<Location>;
}

/// Coarse location via an IP geolocation service
pub struct IpLocationProvider {
    client: reqwest::Client,
    url: String,
}

impl IpLocationProvider {
    /// Create a provider against the given geolocation URL
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl LocationProvider for IpLocationProvider {
    async fn locate(&self) -> Result<Location> {
        let request = self.client.get(&self.url).timeout(Duration::from_secs(5));

        let response = request
            .send()
            .await
            .map_err(|e| Error::Location(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Location(format!(
                "geolocation service error {}",
                response.status()
            )));
        }

        let location: Location = response
            .json()
            .await
            .map_err(|e| Error::Location(e.to_string()))?;

        tracing::debug!(
            latitude = location.latitude,
            longitude = location.longitude,
            "location acquired"
        );
        Ok(location)
    }
}

/// Embeddable map URL for the alert surface.
///
/// # Errors
///
/// Returns [`Error::MapUnavailable`] when no map credential is configured;
/// callers fall back to [`coordinate_view`].
pub fn map_embed_url(api_key: &str, location: &Location) -> Result<String> {
    if api_key.is_empty() {
        return Err(Error::MapUnavailable(
            "no map API key configured".to_string(),
        ));
    }
    Ok(format!(
        "https://www.google.com/maps/embed/v1/view?key={}&center={:.6},{:.6}&zoom=18",
        api_key, location.latitude, location.longitude
    ))
}

/// Coordinate-only fallback when the map surface is unavailable
#[must_use]
pub fn coordinate_view(location: &Location) -> String {
    format!(
        "Latitude {:.4}, Longitude {:.4}",
        location.latitude, location.longitude
    )
}
