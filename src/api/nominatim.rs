use serde::Deserialize;
use serde_with::serde_as;
use ureq::Agent;

use crate::{
    api::client,
    core::provider::{Coordinates, GeocodeLookup},
    prelude::*,
};

/// OpenStreetMap address search.
pub struct Api {
    client: Agent,
}

impl Default for Api {
    fn default() -> Self {
        // Nominatim usage policy requires an identifying user agent:
        Self { client: client::new(client::USER_AGENT) }
    }
}

impl GeocodeLookup for Api {
    #[instrument(skip_all, fields(address = address))]
    fn resolve(&self, address: &str) -> Result<Coordinates> {
        info!("looking up…");
        let places: Vec<Place> = self
            .client
            .get("https://nominatim.openstreetmap.org/search")
            .query("q", address)
            .query("format", "json")
            .call()
            .context("failed to search the address")?
            .body_mut()
            .read_json()
            .context("failed to deserialize the search results")?;
        let place = places
            .into_iter()
            .next()
            .with_context(|| format!("nothing is found at `{address}`"))?;
        info!(%place.display_name, place.latitude, place.longitude, "found");
        Ok(Coordinates { latitude: place.latitude, longitude: place.longitude })
    }
}

#[serde_as]
#[derive(Deserialize)]
struct Place {
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(rename = "lat")]
    latitude: f64,

    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(rename = "lon")]
    longitude: f64,

    #[serde(default)]
    display_name: String,
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn places_ok() -> Result {
        // language=json
        let body = r#"[
            {
                "place_id": 85865123,
                "licence": "Data © OpenStreetMap contributors, ODbL 1.0. http://osm.org/copyright",
                "osm_type": "node",
                "osm_id": 8396526347,
                "lat": "52.3730796",
                "lon": "4.8924534",
                "class": "place",
                "type": "square",
                "place_rank": 25,
                "importance": 0.55,
                "addresstype": "square",
                "name": "Dam",
                "display_name": "Dam, Burgwallen-Oude Zijde, Amsterdam, Noord-Holland, Nederland",
                "boundingbox": ["52.3725796", "52.3735796", "4.8919534", "4.8929534"]
            }
        ]"#;
        let places = serde_json::from_str::<Vec<Place>>(body)?;
        assert_eq!(places.len(), 1);
        assert_abs_diff_eq!(places[0].latitude, 52.373_079_6);
        assert_abs_diff_eq!(places[0].longitude, 4.892_453_4);
        Ok(())
    }

    #[test]
    #[ignore = "makes the API request"]
    fn resolve_online_ok() -> Result {
        let coordinates = Api::default().resolve("Dam, Amsterdam")?;
        assert!((52.0..53.0).contains(&coordinates.latitude));
        assert!((4.0..5.0).contains(&coordinates.longitude));
        Ok(())
    }
}
