mod client;
pub mod forecast_solar;
pub mod growatt;
pub mod nominatim;
