//! WMS tile source definition and `GetMap` request building

use serde::{Deserialize, Serialize};

use super::BoundingBox;

/// A WMS layer stack served from one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmsSource {
    /// Name used in logs, events and the `--source` flag
    pub name: String,

    /// Base endpoint; may already carry query parameters (e.g. `?map=foo.map`)
    pub url: String,

    /// Layers to request, bottom to top
    pub layers: Vec<String>,

    /// Styles, one per layer or empty for server defaults
    #[serde(default)]
    pub styles: Vec<String>,

    /// WMS protocol version (1.1.1 or 1.3.0)
    #[serde(default = "default_version")]
    pub version: String,

    /// Spatial reference system of the bounding box
    #[serde(default = "default_srs")]
    pub srs: String,

    /// Image MIME type
    #[serde(default = "default_format")]
    pub format: String,

    /// Ask the server for a transparent background
    #[serde(default = "default_transparent")]
    pub transparent: bool,
}

fn default_version() -> String {
    "1.1.1".to_string()
}

fn default_srs() -> String {
    "EPSG:4326".to_string()
}

fn default_format() -> String {
    "image/png".to_string()
}

fn default_transparent() -> bool {
    true
}

impl WmsSource {
    /// Create a source with default version, SRS and format
    pub fn new(name: &str, url: &str, layers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            layers: layers.iter().map(ToString::to_string).collect(),
            styles: Vec::new(),
            version: default_version(),
            srs: default_srs(),
            format: default_format(),
            transparent: default_transparent(),
        }
    }

    /// Whether the bounding box must be sent in EPSG:3857 metres
    fn is_web_mercator(&self) -> bool {
        matches!(
            self.srs.to_ascii_uppercase().as_str(),
            "EPSG:3857" | "EPSG:900913"
        )
    }

    fn is_v13(&self) -> bool {
        self.version.starts_with("1.3")
    }

    /// Build a `GetMap` request URL for one tile.
    pub fn get_map_url(&self, bbox: &BoundingBox, width: u32, height: u32) -> String {
        let separator = match self.url.find('?') {
            None => "?",
            Some(_) if self.url.ends_with('?') || self.url.ends_with('&') => "",
            Some(_) => "&",
        };

        let (min_x, min_y, max_x, max_y) = if self.is_web_mercator() {
            bbox.to_web_mercator()
        } else if self.is_v13() && self.srs.eq_ignore_ascii_case("EPSG:4326") {
            // WMS 1.3.0 uses the EPSG axis order for 4326: latitude first
            (bbox.min_lat, bbox.min_lon, bbox.max_lat, bbox.max_lon)
        } else {
            (bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat)
        };

        let crs_param = if self.is_v13() { "CRS" } else { "SRS" };

        format!(
            "{}{}SERVICE=WMS&VERSION={}&REQUEST=GetMap&LAYERS={}&STYLES={}&{}={}&BBOX={},{},{},{}&WIDTH={}&HEIGHT={}&FORMAT={}&TRANSPARENT={}",
            self.url,
            separator,
            urlencoding::encode(&self.version),
            encode_list(&self.layers),
            encode_list(&self.styles),
            crs_param,
            urlencoding::encode(&self.srs),
            min_x,
            min_y,
            max_x,
            max_y,
            width,
            height,
            urlencoding::encode(&self.format),
            if self.transparent { "TRUE" } else { "FALSE" },
        )
    }
}

fn encode_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| urlencoding::encode(v).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}
