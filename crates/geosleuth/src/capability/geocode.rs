//! Place lookup through a Nominatim-compatible geocoder

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    parse_arguments, schema_of, Capability, CapabilityError, CapabilityKind, CapabilityResult,
};

const DEFAULT_LIMIT: usize = 3;
const MAX_LIMIT: usize = 10;

#[derive(Debug, Deserialize, JsonSchema)]
struct GeocodeArgs {
    /// Free-form place query, e.g. "Storgata 62, Tromsø"
    query: String,
    /// Number of candidate places (1-10, default 3)
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    #[serde(default)]
    display_name: String,
    lat: String,
    lon: String,
    #[serde(default, rename = "type")]
    place_type: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
    place_type: String,
}

pub struct GeocodeCapability {
    client: Client,
    endpoint: String,
    user_agent: String,
}

impl GeocodeCapability {
    pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Places with unparseable coordinates are dropped
    fn places(raw: Vec<NominatimPlace>) -> Vec<Place> {
        raw.into_iter()
            .filter_map(|p| {
                Some(Place {
                    latitude: p.lat.parse().ok()?,
                    longitude: p.lon.parse().ok()?,
                    name: if p.display_name.is_empty() {
                        "Unknown".to_string()
                    } else {
                        p.display_name
                    },
                    place_type: p.place_type.unwrap_or_else(|| "location".to_string()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Capability for GeocodeCapability {
    fn name(&self) -> &str {
        "lookup_location"
    }

    fn description(&self) -> &str {
        "Look up a place, address or landmark in OpenStreetMap and return matching \
         places with coordinates. Use it to confirm that a candidate address exists."
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Geocode
    }

    fn parameter_schema(&self) -> Value {
        schema_of::<GeocodeArgs>()
    }

    async fn invoke(&self, arguments: Value) -> Result<CapabilityResult, CapabilityError> {
        let args: GeocodeArgs = parse_arguments(arguments)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Ok(CapabilityResult::failure("query must not be empty"));
        }
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT).to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .header("User-Agent", &self.user_agent)
            .query(&[("q", query), ("format", "json"), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::Upstream {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let raw: Vec<NominatimPlace> = response.json().await?;
        let places = Self::places(raw);
        tracing::debug!("[CAPABILITY] lookup_location '{}' -> {} places", query, places.len());

        if places.is_empty() {
            return Ok(CapabilityResult::ok(json!({
                "query": query,
                "message": "No location found in OpenStreetMap",
                "places": [],
            })));
        }

        Ok(CapabilityResult::ok(json!({ "query": query, "places": places })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_places_parse_coordinates() {
        let raw: Vec<NominatimPlace> = serde_json::from_value(json!([
            {
                "display_name": "Storgata, Tromsø, Troms, Norge",
                "lat": "69.6489",
                "lon": "18.9551",
                "type": "residential"
            },
            {"display_name": "", "lat": "69.0", "lon": "18.0"},
            {"display_name": "bad", "lat": "north", "lon": "18.0"}
        ]))
        .unwrap();

        let places = GeocodeCapability::places(raw);
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].latitude, 69.6489);
        assert_eq!(places[0].place_type, "residential");
        assert_eq!(places[1].name, "Unknown");
        assert_eq!(places[1].place_type, "location");
    }

    #[tokio::test]
    async fn test_missing_query_is_invalid() {
        let capability = GeocodeCapability::new("http://127.0.0.1:9/search", "test");
        let err = capability.invoke(json!({"limit": 2})).await.unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArguments(_)));
    }
}
