use crate::config::LayerPaths;
use crate::types::{ConservationUnit, LayerData, Municipality, River};
use geo::{MultiLineString, MultiPolygon};
use geojson::GeoJson;
use shapefile::dbase::FieldValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load failures come in exactly two kinds: the input layout is
/// incomplete, or a file exists but could not be read/parsed. The
/// second carries the raw underlying message without further
/// classification.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("missing input file(s): {}", list_paths(.0))]
    MissingFiles(Vec<PathBuf>),

    #[error("{0}")]
    Load(String),
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load all three layers, or nothing. Existence of every path is
/// checked before any file is opened, so one missing file blocks the
/// other two even though the datasets are independent.
pub fn load_layers(paths: &LayerPaths) -> Result<LayerData, LoadError> {
    let missing = paths.missing();
    if !missing.is_empty() {
        return Err(LoadError::MissingFiles(missing));
    }

    println!("Loading layers...");

    let conservation_units = load_conservation_units(&paths.conservation_units)?;
    let municipalities = load_municipalities(&paths.municipalities)?;
    let rivers = load_rivers(&paths.rivers)?;

    println!(
        "Loaded {} conservation units, {} municipalities, {} rivers",
        conservation_units.len(),
        municipalities.len(),
        rivers.len()
    );

    Ok(LayerData {
        conservation_units,
        municipalities,
        rivers,
    })
}

/// Explicit cache keyed by the input path tuple. The serve variant
/// goes through this so repeated sessions against the same files do
/// not re-read disk until the process restarts or the entry is
/// invalidated.
#[derive(Default)]
pub struct LayerCache {
    entries: HashMap<LayerPaths, Arc<LayerData>>,
}

impl LayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, paths: &LayerPaths) -> Result<Arc<LayerData>, LoadError> {
        if let Some(data) = self.entries.get(paths) {
            return Ok(Arc::clone(data));
        }
        let data = Arc::new(load_layers(paths)?);
        self.entries.insert(paths.clone(), Arc::clone(&data));
        Ok(data)
    }

    pub fn invalidate(&mut self, paths: &LayerPaths) {
        self.entries.remove(paths);
    }
}

fn extension_of(path: &Path) -> Result<String, LoadError> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| LoadError::Load(format!("Input file {:?} has no extension", path)))
}

fn load_conservation_units(path: &Path) -> Result<Vec<ConservationUnit>, LoadError> {
    match extension_of(path)?.as_str() {
        "shp" => conservation_units_from_shapefile(path),
        "json" | "geojson" => conservation_units_from_geojson(path),
        ext => Err(LoadError::Load(format!(
            "Unsupported geometry format: {}",
            ext
        ))),
    }
}

fn load_municipalities(path: &Path) -> Result<Vec<Municipality>, LoadError> {
    match extension_of(path)?.as_str() {
        "shp" => municipalities_from_shapefile(path),
        "json" | "geojson" => municipalities_from_geojson(path),
        ext => Err(LoadError::Load(format!(
            "Unsupported geometry format: {}",
            ext
        ))),
    }
}

fn load_rivers(path: &Path) -> Result<Vec<River>, LoadError> {
    match extension_of(path)?.as_str() {
        "shp" => rivers_from_shapefile(path),
        "json" | "geojson" => rivers_from_geojson(path),
        ext => Err(LoadError::Load(format!(
            "Unsupported geometry format: {}",
            ext
        ))),
    }
}

// dbase attribute helpers. Absent or null fields come back as empty
// string / 0.0 rather than failing the whole load.

fn text_field(record: &shapefile::dbase::Record, name: &str) -> String {
    match record.get(name) {
        Some(FieldValue::Character(Some(s))) => s.trim().to_string(),
        _ => String::new(),
    }
}

fn numeric_field(record: &shapefile::dbase::Record, name: &str) -> f64 {
    match record.get(name) {
        Some(FieldValue::Numeric(Some(v))) => *v,
        Some(FieldValue::Float(Some(v))) => *v as f64,
        _ => 0.0,
    }
}

fn shape_to_multipolygon(shape: shapefile::Shape) -> Result<Option<MultiPolygon<f64>>, LoadError> {
    let mp = match shape {
        shapefile::Shape::Polygon(p) => Some(
            p.try_into()
                .map_err(|e| LoadError::Load(format!("Failed to convert polygon: {:?}", e)))?,
        ),
        shapefile::Shape::PolygonM(p) => Some(
            p.try_into()
                .map_err(|e| LoadError::Load(format!("Failed to convert polygonM: {:?}", e)))?,
        ),
        shapefile::Shape::PolygonZ(p) => Some(
            p.try_into()
                .map_err(|e| LoadError::Load(format!("Failed to convert polygonZ: {:?}", e)))?,
        ),
        // Non-polygon records in a polygon layer are skipped.
        _ => None,
    };
    Ok(mp)
}

fn shape_to_multilinestring(
    shape: shapefile::Shape,
) -> Result<Option<MultiLineString<f64>>, LoadError> {
    let mls = match shape {
        shapefile::Shape::Polyline(l) => Some(
            l.try_into()
                .map_err(|e| LoadError::Load(format!("Failed to convert polyline: {:?}", e)))?,
        ),
        shapefile::Shape::PolylineM(l) => Some(
            l.try_into()
                .map_err(|e| LoadError::Load(format!("Failed to convert polylineM: {:?}", e)))?,
        ),
        shapefile::Shape::PolylineZ(l) => Some(
            l.try_into()
                .map_err(|e| LoadError::Load(format!("Failed to convert polylineZ: {:?}", e)))?,
        ),
        _ => None,
    };
    Ok(mls)
}

fn conservation_units_from_shapefile(path: &Path) -> Result<Vec<ConservationUnit>, LoadError> {
    let mut reader = shapefile::Reader::from_path(path)
        .map_err(|e| LoadError::Load(format!("Failed to open Shapefile {:?}: {}", path, e)))?;

    let mut units = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| LoadError::Load(e.to_string()))?;
        let Some(geometry) = shape_to_multipolygon(shape)? else {
            continue;
        };
        units.push(ConservationUnit {
            name: text_field(&record, "uc"),
            category: text_field(&record, "categoria"),
            designation: text_field(&record, "tipo"),
            area_ha: numeric_field(&record, "area_ha"),
            geometry,
        });
    }
    Ok(units)
}

fn municipalities_from_shapefile(path: &Path) -> Result<Vec<Municipality>, LoadError> {
    let mut reader = shapefile::Reader::from_path(path)
        .map_err(|e| LoadError::Load(format!("Failed to open Shapefile {:?}: {}", path, e)))?;

    let mut municipalities = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| LoadError::Load(e.to_string()))?;
        let Some(geometry) = shape_to_multipolygon(shape)? else {
            continue;
        };
        municipalities.push(Municipality {
            name: text_field(&record, "NOME"),
            geometry,
        });
    }
    Ok(municipalities)
}

fn rivers_from_shapefile(path: &Path) -> Result<Vec<River>, LoadError> {
    let mut reader = shapefile::Reader::from_path(path)
        .map_err(|e| LoadError::Load(format!("Failed to open Shapefile {:?}: {}", path, e)))?;

    let mut rivers = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| LoadError::Load(e.to_string()))?;
        let Some(geometry) = shape_to_multilinestring(shape)? else {
            continue;
        };
        rivers.push(River {
            name: text_field(&record, "nome"),
            geometry,
        });
    }
    Ok(rivers)
}

// GeoJSON variants. Warning: these load the whole file into memory.

fn read_feature_collection(path: &Path) -> Result<geojson::FeatureCollection, LoadError> {
    let file = File::open(path)
        .map_err(|e| LoadError::Load(format!("Failed to open GeoJSON file {:?}: {}", path, e)))?;
    let reader = BufReader::new(file);
    let geojson = GeoJson::from_reader(reader)
        .map_err(|e| LoadError::Load(format!("Failed to parse GeoJSON {:?}: {}", path, e)))?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(LoadError::Load(format!(
            "GeoJSON {:?} must be a FeatureCollection",
            path
        ))),
    }
}

fn property_string(feature: &geojson::Feature, name: &str) -> String {
    match feature.property(name) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn property_number(feature: &geojson::Feature, name: &str) -> f64 {
    feature
        .property(name)
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}

fn feature_multipolygon(
    feature: &geojson::Feature,
) -> Result<Option<MultiPolygon<f64>>, LoadError> {
    let Some(geom) = &feature.geometry else {
        return Ok(None);
    };
    let geo_geom: geo::Geometry<f64> = geom
        .value
        .clone()
        .try_into()
        .map_err(|e| LoadError::Load(format!("Failed to convert geojson geometry: {:?}", e)))?;
    Ok(match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        _ => None,
    })
}

fn feature_multilinestring(
    feature: &geojson::Feature,
) -> Result<Option<MultiLineString<f64>>, LoadError> {
    let Some(geom) = &feature.geometry else {
        return Ok(None);
    };
    let geo_geom: geo::Geometry<f64> = geom
        .value
        .clone()
        .try_into()
        .map_err(|e| LoadError::Load(format!("Failed to convert geojson geometry: {:?}", e)))?;
    Ok(match geo_geom {
        geo::Geometry::MultiLineString(mls) => Some(mls),
        geo::Geometry::LineString(ls) => Some(MultiLineString::new(vec![ls])),
        _ => None,
    })
}

fn conservation_units_from_geojson(path: &Path) -> Result<Vec<ConservationUnit>, LoadError> {
    let collection = read_feature_collection(path)?;
    let mut units = Vec::new();
    for feature in &collection.features {
        let Some(geometry) = feature_multipolygon(feature)? else {
            continue;
        };
        units.push(ConservationUnit {
            name: property_string(feature, "uc"),
            category: property_string(feature, "categoria"),
            designation: property_string(feature, "tipo"),
            area_ha: property_number(feature, "area_ha"),
            geometry,
        });
    }
    Ok(units)
}

fn municipalities_from_geojson(path: &Path) -> Result<Vec<Municipality>, LoadError> {
    let collection = read_feature_collection(path)?;
    let mut municipalities = Vec::new();
    for feature in &collection.features {
        let Some(geometry) = feature_multipolygon(feature)? else {
            continue;
        };
        municipalities.push(Municipality {
            name: property_string(feature, "NOME"),
            geometry,
        });
    }
    Ok(municipalities)
}

fn rivers_from_geojson(path: &Path) -> Result<Vec<River>, LoadError> {
    let collection = read_feature_collection(path)?;
    let mut rivers = Vec::new();
    for feature in &collection.features {
        let Some(geometry) = feature_multilinestring(feature)? else {
            continue;
        };
        rivers.push(River {
            name: property_string(feature, "nome"),
            geometry,
        });
    }
    Ok(rivers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const UC_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {
                    "uc": "Estação Ecológica de Itirapina",
                    "categoria": "Estação Ecológica",
                    "tipo": "Unidade de Conservação de Proteção Integral",
                    "area_ha": 2300.5
                },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-47.9, -22.2], [-47.8, -22.2], [-47.8, -22.1], [-47.9, -22.2]]]
                }
            },
            {
                "type": "Feature",
                "properties": {
                    "uc": "APA Corumbataí",
                    "categoria": "Área de Proteção Ambiental",
                    "tipo": "Unidade de Conservação de Uso Sustentável",
                    "area_ha": 272692.0
                },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[-47.7, -22.3], [-47.6, -22.3], [-47.6, -22.2], [-47.7, -22.3]]]]
                }
            }
        ]
    }"#;

    const MUNICIPALITIES_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "NOME": "Brotas" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-48.2, -22.3], [-48.0, -22.3], [-48.0, -22.1], [-48.2, -22.3]]]
                }
            }
        ]
    }"#;

    const RIVERS_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "nome": "Rio Jacaré-Pepira" },
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[-48.4, -22.4], [-48.2, -22.3], [-48.0, -22.2]]
                }
            },
            {
                "type": "Feature",
                "properties": { "nome": "Rio Tietê" },
                "geometry": {
                    "type": "MultiLineString",
                    "coordinates": [[[-48.5, -22.5], [-48.3, -22.4]]]
                }
            }
        ]
    }"#;

    fn write_fixture_layers(dir: &Path) -> LayerPaths {
        let uc = dir.join("unidades_conservacao.geojson");
        let mun = dir.join("municipios.geojson");
        let rios = dir.join("rios.geojson");
        fs::write(&uc, UC_GEOJSON).unwrap();
        fs::write(&mun, MUNICIPALITIES_GEOJSON).unwrap();
        fs::write(&rios, RIVERS_GEOJSON).unwrap();
        LayerPaths {
            conservation_units: uc,
            municipalities: mun,
            rivers: rios,
        }
    }

    #[test]
    fn loads_all_three_collections_with_source_counts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_fixture_layers(dir.path());

        let data = load_layers(&paths).unwrap();
        assert_eq!(data.conservation_units.len(), 2);
        assert_eq!(data.municipalities.len(), 1);
        assert_eq!(data.rivers.len(), 2);

        let first = &data.conservation_units[0];
        assert_eq!(first.name, "Estação Ecológica de Itirapina");
        assert_eq!(first.category, "Estação Ecológica");
        assert_eq!(
            first.designation,
            "Unidade de Conservação de Proteção Integral"
        );
        assert_eq!(first.area_ha, 2300.5);

        assert_eq!(data.municipalities[0].name, "Brotas");
        assert_eq!(data.rivers[1].name, "Rio Tietê");
    }

    #[test]
    fn one_missing_path_blocks_the_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_fixture_layers(dir.path());
        paths.rivers = dir.path().join("does_not_exist.geojson");

        let err = load_layers(&paths).unwrap_err();
        match err {
            LoadError::MissingFiles(missing) => {
                assert_eq!(missing, vec![paths.rivers.clone()]);
            }
            other => panic!("expected MissingFiles, got {:?}", other),
        }
    }

    #[test]
    fn every_missing_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let paths = LayerPaths {
            conservation_units: dir.path().join("a.geojson"),
            municipalities: dir.path().join("b.geojson"),
            rivers: dir.path().join("c.geojson"),
        };

        let err = load_layers(&paths).unwrap_err();
        match err {
            LoadError::MissingFiles(missing) => assert_eq!(missing.len(), 3),
            other => panic!("expected MissingFiles, got {:?}", other),
        }
    }

    #[test]
    fn malformed_file_is_a_generic_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_fixture_layers(dir.path());
        paths.conservation_units = dir.path().join("broken.geojson");
        fs::write(&paths.conservation_units, "this is not geojson").unwrap();

        let err = load_layers(&paths).unwrap_err();
        assert!(matches!(err, LoadError::Load(_)));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_fixture_layers(dir.path());
        paths.rivers = dir.path().join("rios.csv");
        fs::write(&paths.rivers, "nome\nRio Tietê\n").unwrap();

        let err = load_layers(&paths).unwrap_err();
        match err {
            LoadError::Load(msg) => assert!(msg.contains("Unsupported geometry format")),
            other => panic!("expected Load, got {:?}", other),
        }
    }

    #[test]
    fn cache_returns_the_same_collections_without_reloading() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_fixture_layers(dir.path());

        let mut cache = LayerCache::new();
        let first = cache.get_or_load(&paths).unwrap();

        // A second call must be served from memory even if the files
        // have since changed on disk.
        fs::write(&paths.rivers, "{ \"type\": \"FeatureCollection\", \"features\": [] }")
            .unwrap();
        let second = cache.get_or_load(&paths).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.rivers.len(), 2);

        cache.invalidate(&paths);
        let third = cache.get_or_load(&paths).unwrap();
        assert_eq!(third.rivers.len(), 0);
    }
}
