use std::path::{Path, PathBuf};

// The tool is deliberately not configurable: the input layout and the
// output location are part of its contract.
pub const CONSERVATION_UNITS_PATH: &str = "data/unidades_conservacao/unidades_conservacao.shp";
pub const MUNICIPALITIES_PATH: &str = "data/municipios/municipios.shp";
pub const RIVERS_PATH: &str = "data/rios/rios.shp";

pub const OUTPUT_HTML: &str = "webmap_unidades_conservacao.html";

/// Map center, roughly the middle of the area covered by the data.
pub const CENTER_LAT: f64 = -22.268;
pub const CENTER_LON: f64 = -48.433;

pub const DEFAULT_ZOOM: u8 = 7;
pub const MIN_ZOOM: u8 = 5;
pub const MAX_ZOOM: u8 = 12;

pub const SERVER_PORT: u16 = 3000;

/// The three input files as a unit. Hash/Eq so the tuple can key the
/// layer cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerPaths {
    pub conservation_units: PathBuf,
    pub municipalities: PathBuf,
    pub rivers: PathBuf,
}

impl Default for LayerPaths {
    fn default() -> Self {
        LayerPaths {
            conservation_units: PathBuf::from(CONSERVATION_UNITS_PATH),
            municipalities: PathBuf::from(MUNICIPALITIES_PATH),
            rivers: PathBuf::from(RIVERS_PATH),
        }
    }
}

impl LayerPaths {
    pub fn all(&self) -> [&Path; 3] {
        [
            &self.conservation_units,
            &self.municipalities,
            &self.rivers,
        ]
    }

    /// Paths that do not exist on disk, in declaration order.
    pub fn missing(&self) -> Vec<PathBuf> {
        self.all()
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.to_path_buf())
            .collect()
    }
}
