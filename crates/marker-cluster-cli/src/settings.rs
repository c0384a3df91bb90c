use clap::Parser;
use marker_cluster_lib::{Config, LatLng};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Marker Cluster - Replay map viewport events against a marker set and print the visible markers
pub struct Settings {
    /// JSON file with the markers: [{"id", "location": {"lat", "lng"}, "meta"?}, ...]
    #[clap(short, long, value_name = "FILE")]
    pub points: PathBuf,

    /// JSON file with viewport events to replay (overrides the single viewport options)
    #[clap(short, long, value_name = "FILE")]
    pub events: Option<PathBuf>,

    /// First corner of the viewport as "lat,lng"
    #[clap(long, value_parser = parse_lat_lng, allow_hyphen_values = true, default_value = "35.6128,139.7129")]
    pub corner_a: LatLng,

    /// Opposite corner of the viewport as "lat,lng"
    #[clap(long, value_parser = parse_lat_lng, allow_hyphen_values = true, default_value = "35.6328,139.7329")]
    pub corner_b: LatLng,

    /// Map width in pixels
    #[clap(long, default_value = "700")]
    pub width: u32,

    /// Map height in pixels
    #[clap(long, default_value = "700")]
    pub height: u32,

    /// On-screen distance below which markers merge into a cluster
    #[clap(short, long, default_value = "100")]
    pub radius_in_pixels: f64,

    /// Quiet time in milliseconds before a viewport change is published
    #[clap(long, default_value = "1000")]
    pub debounce_ms: u64,

    /// Maximum leaf size of the spatial index
    #[clap(long, default_value = "64")]
    pub node_size: usize,

    /// Only print the markers of the last published viewport
    #[clap(long, default_value = "false")]
    pub final_only: bool,

    /// Pretty-print the JSON output
    #[clap(long, default_value = "false")]
    pub pretty: bool,
}

impl Settings {
    /// Layer configuration derived from the command line
    pub fn layer_config(&self) -> Config {
        Config {
            radius_in_pixels: self.radius_in_pixels,
            debounce: Duration::from_millis(self.debounce_ms),
            node_size: self.node_size,
        }
    }
}

/// Parse a `"lat,lng"` pair
pub fn parse_lat_lng(value: &str) -> Result<LatLng, String> {
    let (lat, lng) = value
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lng\", got \"{value}\""))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("invalid latitude \"{lat}\": {e}"))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|e| format!("invalid longitude \"{lng}\": {e}"))?;
    Ok(LatLng::new(lat, lng))
}
