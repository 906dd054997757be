use geo::{MultiLineString, MultiPolygon};

#[derive(Debug, Clone)]
pub struct ConservationUnit {
    pub name: String,
    pub category: String,
    /// Raw "tipo" attribute; drives the proteção integral / uso sustentável split.
    pub designation: String,
    pub area_ha: f64,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct Municipality {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct River {
    pub name: String,
    pub geometry: MultiLineString<f64>,
}

/// The three source collections, loaded together and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct LayerData {
    pub conservation_units: Vec<ConservationUnit>,
    pub municipalities: Vec<Municipality>,
    pub rivers: Vec<River>,
}
