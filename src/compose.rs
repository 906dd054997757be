use crate::config;
use crate::types::{ConservationUnit, LayerData};
use geojson::{Feature, FeatureCollection};
use serde_json::{Map, Value};

pub const PROTECAO_INTEGRAL: &str = "Unidade de Conservação de Proteção Integral";
pub const USO_SUSTENTAVEL: &str = "Unidade de Conservação de Uso Sustentável";

/// Base tile provider. Exactly one is active per composed map; the
/// layer control still offers all three so the user can switch
/// client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Basemap {
    #[default]
    OpenStreetMap,
    EsriSatellite,
    CartoPositron,
}

impl Basemap {
    pub const ALL: [Basemap; 3] = [
        Basemap::OpenStreetMap,
        Basemap::EsriSatellite,
        Basemap::CartoPositron,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Basemap::OpenStreetMap => "osm",
            Basemap::EsriSatellite => "esri",
            Basemap::CartoPositron => "carto",
        }
    }

    pub fn from_key(key: &str) -> Option<Basemap> {
        match key {
            "osm" => Some(Basemap::OpenStreetMap),
            "esri" => Some(Basemap::EsriSatellite),
            "carto" => Some(Basemap::CartoPositron),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Basemap::OpenStreetMap => "OpenStreetMap",
            Basemap::EsriSatellite => "Satélite (Esri)",
            Basemap::CartoPositron => "CartoDB Positron",
        }
    }

    pub fn tile_url(&self) -> &'static str {
        match self {
            Basemap::OpenStreetMap => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            Basemap::EsriSatellite => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
            }
            Basemap::CartoPositron => {
                "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png"
            }
        }
    }

    pub fn attribution(&self) -> &'static str {
        match self {
            Basemap::OpenStreetMap => {
                "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors"
            }
            Basemap::EsriSatellite => "Esri",
            Basemap::CartoPositron => {
                "&copy; OpenStreetMap contributors &copy; <a href=\"https://carto.com/attributions\">CARTO</a>"
            }
        }
    }
}

/// The four overlays, in the order they are attached to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerId {
    ProtecaoIntegral,
    UsoSustentavel,
    Municipios,
    Rios,
}

impl LayerId {
    pub fn name(&self) -> &'static str {
        match self {
            LayerId::ProtecaoIntegral => "Unidades de Proteção Integral",
            LayerId::UsoSustentavel => "Unidades de Uso Sustentável",
            LayerId::Municipios => "Municípios",
            LayerId::Rios => "Rios",
        }
    }
}

/// Static per-layer styling. Rivers are lines, so they carry no fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerStyle {
    pub fill_color: Option<&'static str>,
    pub color: &'static str,
    pub weight: f64,
    pub fill_opacity: f64,
}

pub const fn style(id: LayerId) -> LayerStyle {
    match id {
        LayerId::ProtecaoIntegral => LayerStyle {
            fill_color: Some("darkgreen"),
            color: "darkgreen",
            weight: 1.0,
            fill_opacity: 0.5,
        },
        LayerId::UsoSustentavel => LayerStyle {
            fill_color: Some("lightgreen"),
            color: "lightgreen",
            weight: 1.0,
            fill_opacity: 0.5,
        },
        LayerId::Municipios => LayerStyle {
            fill_color: Some("gray"),
            color: "gray",
            weight: 0.3,
            fill_opacity: 0.0,
        },
        LayerId::Rios => LayerStyle {
            fill_color: None,
            color: "blue",
            weight: 0.3,
            fill_opacity: 0.0,
        },
    }
}

/// Hover tooltip: attribute columns shown under human-readable labels.
#[derive(Debug, Clone, Copy)]
pub struct TooltipSpec {
    pub fields: &'static [&'static str],
    pub aliases: &'static [&'static str],
}

pub const fn tooltip(id: LayerId) -> TooltipSpec {
    match id {
        LayerId::ProtecaoIntegral | LayerId::UsoSustentavel => TooltipSpec {
            fields: &["uc", "categoria", "area_ha"],
            aliases: &["Nome:", "Categoria:", "Área (ha):"],
        },
        LayerId::Municipios => TooltipSpec {
            fields: &["NOME"],
            aliases: &["Município:"],
        },
        LayerId::Rios => TooltipSpec {
            fields: &["nome"],
            aliases: &["Rio:"],
        },
    }
}

/// Layer visibility. An overlay toggled off is never attached, not
/// merely hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerToggles {
    pub protecao_integral: bool,
    pub uso_sustentavel: bool,
    pub municipios: bool,
    pub rios: bool,
}

impl Default for LayerToggles {
    fn default() -> Self {
        LayerToggles {
            protecao_integral: true,
            uso_sustentavel: true,
            municipios: true,
            rios: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Overlay {
    pub id: LayerId,
    pub style: LayerStyle,
    pub tooltip: TooltipSpec,
    pub features: FeatureCollection,
}

#[derive(Debug, Clone)]
pub struct ComposedMap {
    pub center: (f64, f64),
    pub zoom: u8,
    pub basemap: Basemap,
    pub overlays: Vec<Overlay>,
}

impl ComposedMap {
    pub fn overlay(&self, id: LayerId) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.id == id)
    }
}

/// Split conservation units by the "tipo" attribute against the two
/// known literals. A unit matching neither ends up in neither subset
/// and is therefore never rendered; this mirrors the source data
/// pipeline but is likely a data-quality gap rather than intent.
pub fn partition_units(
    units: &[ConservationUnit],
) -> (Vec<&ConservationUnit>, Vec<&ConservationUnit>) {
    let integral = units
        .iter()
        .filter(|u| u.designation == PROTECAO_INTEGRAL)
        .collect();
    let sustentavel = units
        .iter()
        .filter(|u| u.designation == USO_SUSTENTAVEL)
        .collect();
    (integral, sustentavel)
}

pub fn compose(
    data: &LayerData,
    toggles: &LayerToggles,
    basemap: Basemap,
    zoom: u8,
) -> ComposedMap {
    let (integral, sustentavel) = partition_units(&data.conservation_units);

    let mut overlays = Vec::new();
    if toggles.protecao_integral {
        overlays.push(make_overlay(LayerId::ProtecaoIntegral, unit_features(&integral)));
    }
    if toggles.uso_sustentavel {
        overlays.push(make_overlay(LayerId::UsoSustentavel, unit_features(&sustentavel)));
    }
    if toggles.municipios {
        overlays.push(make_overlay(LayerId::Municipios, municipality_features(data)));
    }
    if toggles.rios {
        overlays.push(make_overlay(LayerId::Rios, river_features(data)));
    }

    ComposedMap {
        center: (config::CENTER_LAT, config::CENTER_LON),
        zoom,
        basemap,
        overlays,
    }
}

fn make_overlay(id: LayerId, features: FeatureCollection) -> Overlay {
    Overlay {
        id,
        style: style(id),
        tooltip: tooltip(id),
        features,
    }
}

fn feature(geometry: geojson::Value, properties: Map<String, Value>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn unit_features(units: &[&ConservationUnit]) -> FeatureCollection {
    let features = units
        .iter()
        .map(|u| {
            let mut props = Map::new();
            props.insert("uc".into(), Value::String(u.name.clone()));
            props.insert("categoria".into(), Value::String(u.category.clone()));
            props.insert("area_ha".into(), serde_json::json!(u.area_ha));
            feature(geojson::Value::from(&u.geometry), props)
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn municipality_features(data: &LayerData) -> FeatureCollection {
    let features = data
        .municipalities
        .iter()
        .map(|m| {
            let mut props = Map::new();
            props.insert("NOME".into(), Value::String(m.name.clone()));
            feature(geojson::Value::from(&m.geometry), props)
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn river_features(data: &LayerData) -> FeatureCollection {
    let features = data
        .rivers
        .iter()
        .map(|r| {
            let mut props = Map::new();
            props.insert("nome".into(), Value::String(r.name.clone()));
            feature(geojson::Value::from(&r.geometry), props)
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
