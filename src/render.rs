use crate::compose::{Basemap, ComposedMap, Overlay};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Stylesheet and script tags for Leaflet plus the widget plugins
/// (geocoder search, measure tool, mini-map), all from CDN so the
/// exported page is a single file.
pub const HEAD_ASSETS: &str = r#"    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" crossorigin="" />
    <link rel="stylesheet" href="https://unpkg.com/leaflet-control-geocoder@2.4.0/dist/Control.Geocoder.css" />
    <link rel="stylesheet" href="https://unpkg.com/leaflet-measure@3.1.0/dist/leaflet-measure.css" />
    <link rel="stylesheet" href="https://unpkg.com/leaflet-minimap@3.6.1/dist/Control.MiniMap.min.css" />
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js" crossorigin=""></script>
    <script src="https://unpkg.com/leaflet-control-geocoder@2.4.0/dist/Control.Geocoder.js"></script>
    <script src="https://unpkg.com/leaflet-measure@3.1.0/dist/leaflet-measure.js"></script>
    <script src="https://unpkg.com/leaflet-minimap@3.6.1/dist/Control.MiniMap.min.js"></script>
"#;

/// The map div plus the script that builds it: base layer, overlays
/// with styles and tooltips, then the four widgets in fixed order.
/// Everything the script needs is inlined, so the fragment works both
/// in the exported page and embedded in the dashboard.
pub fn map_fragment(map: &ComposedMap) -> String {
    let mut js = String::new();

    writeln!(
        js,
        "var map = L.map('map').setView([{}, {}], {});",
        map.center.0, map.center.1, map.zoom
    )
    .unwrap();

    // All three base layers go into the control; only the selected one
    // is active.
    js.push_str("var baseMaps = {};\n");
    for basemap in Basemap::ALL {
        writeln!(
            js,
            "var base_{key} = L.tileLayer({url}, {{ attribution: {attr} }});",
            key = basemap.key(),
            url = js_string(basemap.tile_url()),
            attr = js_string(basemap.attribution()),
        )
        .unwrap();
        writeln!(
            js,
            "baseMaps[{label}] = base_{key};",
            label = js_string(basemap.label()),
            key = basemap.key(),
        )
        .unwrap();
    }
    writeln!(js, "base_{}.addTo(map);", map.basemap.key()).unwrap();

    js.push_str("var overlays = {};\n");
    for (i, overlay) in map.overlays.iter().enumerate() {
        js.push_str(&overlay_js(i, overlay));
    }

    // Widgets, in the order the map was always assembled: layer
    // control, geocoder, measure tool, mini-map.
    js.push_str(
        "L.control.layers(baseMaps, overlays, { position: 'topright', collapsed: false }).addTo(map);\n",
    );
    js.push_str(
        "L.Control.geocoder({ position: 'topleft', collapsed: false, placeholder: 'Pesquisar local...' }).addTo(map);\n",
    );
    js.push_str("L.control.measure().addTo(map);\n");
    writeln!(
        js,
        "new L.Control.MiniMap(L.tileLayer({url}, {{ attribution: {attr} }}), {{ toggleDisplay: true }}).addTo(map);",
        url = js_string(Basemap::OpenStreetMap.tile_url()),
        attr = js_string(Basemap::OpenStreetMap.attribution()),
    )
    .unwrap();

    format!("<div id=\"map\"></div>\n<script>\n{}</script>\n", js)
}

fn overlay_js(index: usize, overlay: &Overlay) -> String {
    let geojson = serde_json::to_string(&overlay.features)
        .unwrap_or_else(|_| "{\"type\":\"FeatureCollection\",\"features\":[]}".to_string());

    let style = &overlay.style;
    let mut style_props = format!(
        "\"color\": {}, \"weight\": {}, \"fillOpacity\": {}",
        js_string(style.color),
        style.weight,
        style.fill_opacity
    );
    if let Some(fill) = style.fill_color {
        write!(style_props, ", \"fillColor\": {}", js_string(fill)).unwrap();
    }

    // Tooltip content is assembled in the browser from feature
    // properties, so attribute values need no escaping here.
    let tooltip_parts: Vec<String> = overlay
        .tooltip
        .fields
        .iter()
        .zip(overlay.tooltip.aliases.iter())
        .map(|(field, alias)| {
            format!(
                "'<b>' + {alias} + '</b> ' + feature.properties[{field}]",
                alias = js_string(alias),
                field = js_string(field)
            )
        })
        .collect();

    format!(
        "var layer_{index} = L.geoJSON({geojson}, {{\n\
         \x20 style: function (feature) {{ return {{ {style_props} }}; }},\n\
         \x20 onEachFeature: function (feature, layer) {{\n\
         \x20   layer.bindTooltip({tooltip}, {{ sticky: true }});\n\
         \x20 }}\n\
         }}).addTo(map);\n\
         overlays[{name}] = layer_{index};\n",
        index = index,
        geojson = escape_script(&geojson),
        style_props = style_props,
        tooltip = tooltip_parts.join(" + '<br>' + "),
        name = js_string(overlay.id.name()),
    )
}

/// One self-contained page: the export artifact.
pub fn page_html(map: &ComposedMap) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Webmap - Unidades de Conservação</title>
{assets}    <style>
      html, body {{ height: 100%; margin: 0; padding: 0; }}
      #map {{ height: 100%; width: 100%; }}
    </style>
</head>
<body>
{fragment}</body>
</html>
"#,
        assets = HEAD_ASSETS,
        fragment = map_fragment(map),
    )
}

/// Write the composed map to `path`, overwriting whatever is there.
pub fn export(map: &ComposedMap, path: &Path) -> Result<()> {
    let html = page_html(map);
    fs::write(path, html).with_context(|| format!("Failed to write webmap to {:?}", path))?;
    println!("Webmap saved to {:?}", path);
    println!("Open it in a browser to view the map.");
    Ok(())
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// A literal "</script>" inside inlined JSON would end the script tag
/// early.
fn escape_script(s: &str) -> String {
    s.replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{compose, Basemap, LayerToggles, PROTECAO_INTEGRAL};
    use crate::types::{ConservationUnit, LayerData};
    use geo::{polygon, MultiPolygon};

    fn sample_map(basemap: Basemap, toggles: &LayerToggles) -> ComposedMap {
        let data = LayerData {
            conservation_units: vec![ConservationUnit {
                name: "Estação Ecológica de Itirapina".to_string(),
                category: "Estação Ecológica".to_string(),
                designation: PROTECAO_INTEGRAL.to_string(),
                area_ha: 2300.5,
                geometry: MultiPolygon::new(vec![polygon![
                    (x: -47.9, y: -22.2),
                    (x: -47.8, y: -22.2),
                    (x: -47.8, y: -22.1),
                ]]),
            }],
            municipalities: Vec::new(),
            rivers: Vec::new(),
        };
        compose(&data, toggles, basemap, 7)
    }

    #[test]
    fn page_uses_the_selected_basemap() {
        let page = page_html(&sample_map(Basemap::EsriSatellite, &LayerToggles::default()));
        assert!(page.contains("base_esri.addTo(map);"));
        assert!(page.contains("arcgisonline.com"));
        // The other providers are still offered in the control.
        assert!(page.contains("tile.openstreetmap.org"));
        assert!(page.contains("basemaps.cartocdn.com"));
    }

    #[test]
    fn disabled_layers_are_absent_from_the_page() {
        let toggles = LayerToggles {
            protecao_integral: false,
            ..LayerToggles::default()
        };
        let page = page_html(&sample_map(Basemap::OpenStreetMap, &toggles));
        assert!(!page.contains("Unidades de Proteção Integral"));
        assert!(page.contains("Municípios"));
        assert!(page.contains("Rios"));
    }

    #[test]
    fn widgets_appear_in_fixed_order() {
        let page = page_html(&sample_map(Basemap::OpenStreetMap, &LayerToggles::default()));
        let layers = page.find("L.control.layers").unwrap();
        let geocoder = page.find("L.Control.geocoder").unwrap();
        let measure = page.find("L.control.measure").unwrap();
        let minimap = page.find("L.Control.MiniMap").unwrap();
        assert!(layers < geocoder);
        assert!(geocoder < measure);
        assert!(measure < minimap);
    }

    #[test]
    fn rendering_is_deterministic() {
        let map = sample_map(Basemap::OpenStreetMap, &LayerToggles::default());
        assert_eq!(page_html(&map), page_html(&map));
    }

    #[test]
    fn export_overwrites_the_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webmap.html");
        fs::write(&path, "stale content").unwrap();

        let map = sample_map(Basemap::OpenStreetMap, &LayerToggles::default());
        export(&map, &path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("<!DOCTYPE html>"));
        assert!(!written.contains("stale content"));
        assert!(written.contains("Estação Ecológica de Itirapina"));
    }

    #[test]
    fn inlined_geojson_cannot_close_the_script_tag() {
        assert_eq!(escape_script("a </script> b"), "a <\\/script> b");
    }
}
