use crate::compose::{self, Basemap, LayerToggles};
use crate::config::{self, LayerPaths};
use crate::data::LayerCache;
use crate::render;
use crate::types::LayerData;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

/// Decided once at startup. A failed load keeps the session in
/// DataUnavailable until the process restarts; there is no retry.
enum Session {
    Ready(Arc<LayerData>),
    DataUnavailable(String),
}

struct AppState {
    session: Session,
}

/// Raw query string of the dashboard form. Checkboxes only appear in
/// the query when checked, so the marker field `v` distinguishes the
/// first visit (everything on) from a submitted form.
#[derive(Debug, Default, Deserialize)]
pub struct MapQuery {
    v: Option<String>,
    pi: Option<String>,
    us: Option<String>,
    mun: Option<String>,
    rios: Option<String>,
    basemap: Option<String>,
    zoom: Option<u8>,
    tables: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewParams {
    pub toggles: LayerToggles,
    pub basemap: Basemap,
    pub zoom: u8,
    pub tables: bool,
}

impl ViewParams {
    pub fn from_query(q: &MapQuery) -> Self {
        let toggles = if q.v.is_none() {
            LayerToggles::default()
        } else {
            LayerToggles {
                protecao_integral: q.pi.is_some(),
                uso_sustentavel: q.us.is_some(),
                municipios: q.mun.is_some(),
                rios: q.rios.is_some(),
            }
        };
        let basemap = q
            .basemap
            .as_deref()
            .and_then(Basemap::from_key)
            .unwrap_or_default();
        let zoom = q
            .zoom
            .unwrap_or(config::DEFAULT_ZOOM)
            .clamp(config::MIN_ZOOM, config::MAX_ZOOM);
        ViewParams {
            toggles,
            basemap,
            zoom,
            tables: q.tables.is_some(),
        }
    }
}

pub async fn start_server(paths: LayerPaths) -> Result<()> {
    let mut cache = LayerCache::new();
    let session = match cache.get_or_load(&paths) {
        Ok(data) => {
            tracing::info!(
                conservation_units = data.conservation_units.len(),
                municipalities = data.municipalities.len(),
                rivers = data.rivers.len(),
                "layers loaded"
            );
            Session::Ready(data)
        }
        Err(err) => {
            tracing::error!(%err, "failed to load layers; serving diagnostics only");
            Session::DataUnavailable(err.to_string())
        }
    };

    let state = Arc::new(AppState { session });

    let addr = SocketAddr::from(([127, 0, 0, 1], config::SERVER_PORT));
    println!("Starting server on http://{}", addr);

    let app = Router::new()
        .route("/", get(index_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MapQuery>,
) -> Html<String> {
    match &state.session {
        Session::DataUnavailable(message) => Html(diagnostic_page(message)),
        Session::Ready(data) => {
            let params = ViewParams::from_query(&query);
            let map = compose::compose(data, &params.toggles, params.basemap, params.zoom);
            Html(dashboard_page(data, &map, &params))
        }
    }
}

fn dashboard_page(data: &LayerData, map: &compose::ComposedMap, params: &ViewParams) -> String {
    let mut body = String::new();

    body.push_str("<div id=\"sidebar\">\n<h1>🌿 Webmap - Unidades de Conservação</h1>\n");
    body.push_str("<form method=\"get\" action=\"/\">\n");
    body.push_str("<input type=\"hidden\" name=\"v\" value=\"1\" />\n");

    body.push_str("<h2>Camadas do Mapa</h2>\n");
    checkbox(&mut body, "pi", "Unidades de Proteção Integral", params.toggles.protecao_integral);
    checkbox(&mut body, "us", "Unidades de Uso Sustentável", params.toggles.uso_sustentavel);
    checkbox(&mut body, "mun", "Municípios", params.toggles.municipios);
    checkbox(&mut body, "rios", "Rios", params.toggles.rios);

    body.push_str("<h2>Mapa Base</h2>\n<select name=\"basemap\" onchange=\"this.form.submit()\">\n");
    for basemap in Basemap::ALL {
        let selected = if basemap == params.basemap { " selected" } else { "" };
        writeln!(
            body,
            "<option value=\"{}\"{}>{}</option>",
            basemap.key(),
            selected,
            basemap.label()
        )
        .unwrap();
    }
    body.push_str("</select>\n");

    writeln!(
        body,
        "<h2>Configurações</h2>\n<label>Zoom inicial: {}</label>\n\
         <input type=\"range\" name=\"zoom\" min=\"{}\" max=\"{}\" value=\"{}\" onchange=\"this.form.submit()\" />",
        params.zoom,
        config::MIN_ZOOM,
        config::MAX_ZOOM,
        params.zoom
    )
    .unwrap();

    checkbox(&mut body, "tables", "Mostrar dados detalhados", params.tables);
    body.push_str("</form>\n");

    writeln!(
        body,
        "<p class=\"metrics\">Unidades de Conservação: {} · Municípios: {} · Rios: {}</p>",
        data.conservation_units.len(),
        data.municipalities.len(),
        data.rivers.len()
    )
    .unwrap();
    body.push_str("</div>\n");

    body.push_str("<div id=\"main\">\n");
    body.push_str(&render::map_fragment(map));
    if params.tables {
        body.push_str(&data_tables(data));
    }
    body.push_str("</div>\n");

    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Webmap - Unidades de Conservação</title>
{assets}    <style>
      html, body {{ height: 100%; margin: 0; padding: 0; font-family: sans-serif; }}
      body {{ display: flex; }}
      #sidebar {{ width: 280px; padding: 12px; overflow-y: auto; border-right: 1px solid #ccc; }}
      #sidebar h1 {{ font-size: 1.1em; }}
      #sidebar h2 {{ font-size: 0.9em; margin-bottom: 4px; }}
      #sidebar label {{ display: block; }}
      #main {{ flex: 1; overflow-y: auto; display: flex; flex-direction: column; }}
      #map {{ height: 70vh; width: 100%; }}
      table {{ border-collapse: collapse; margin: 12px; }}
      th, td {{ border: 1px solid #ccc; padding: 4px 8px; text-align: left; }}
      .metrics {{ font-size: 0.85em; color: #555; }}
    </style>
</head>
<body>
{body}</body>
</html>
"#,
        assets = render::HEAD_ASSETS,
        body = body,
    )
}

fn checkbox(out: &mut String, name: &str, label: &str, checked: bool) {
    let checked = if checked { " checked" } else { "" };
    writeln!(
        out,
        "<label><input type=\"checkbox\" name=\"{}\" value=\"1\"{} onchange=\"this.form.submit()\" /> {}</label>",
        name, checked, label
    )
    .unwrap();
}

/// Attribute tables for the three collections, geometry omitted.
fn data_tables(data: &LayerData) -> String {
    let mut out = String::new();

    out.push_str("<h2>Dados das Unidades de Conservação</h2>\n<table>\n");
    out.push_str("<tr><th>Nome</th><th>Categoria</th><th>Tipo</th><th>Área (ha)</th></tr>\n");
    for unit in &data.conservation_units {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&unit.name),
            escape_html(&unit.category),
            escape_html(&unit.designation),
            unit.area_ha
        )
        .unwrap();
    }
    out.push_str("</table>\n");

    out.push_str("<h2>Dados dos Municípios</h2>\n<table>\n<tr><th>Nome</th></tr>\n");
    for municipality in &data.municipalities {
        writeln!(out, "<tr><td>{}</td></tr>", escape_html(&municipality.name)).unwrap();
    }
    out.push_str("</table>\n");

    out.push_str("<h2>Dados dos Rios</h2>\n<table>\n<tr><th>Nome</th></tr>\n");
    for river in &data.rivers {
        writeln!(out, "<tr><td>{}</td></tr>", escape_html(&river.name)).unwrap();
    }
    out.push_str("</table>\n");

    out
}

/// Shown for every request while the session is DataUnavailable.
fn diagnostic_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <meta charset="UTF-8" />
    <title>Webmap - Unidades de Conservação</title>
    <style>
      body {{ font-family: sans-serif; margin: 40px; }}
      pre {{ background: #f4f4f4; padding: 12px; }}
      .error {{ color: #a00; }}
    </style>
</head>
<body>
    <h1>Não foi possível carregar os dados</h1>
    <p class="error">{message}</p>
    <p>Verifique se os arquivos shapefile estão no diretório correto.</p>
    <p><b>Estrutura de diretórios esperada:</b></p>
    <pre>
data/
├── unidades_conservacao/
│   └── unidades_conservacao.shp (+ arquivos associados)
├── municipios/
│   └── municipios.shp (+ arquivos associados)
└── rios/
    └── rios.shp (+ arquivos associados)
    </pre>
</body>
</html>
"#,
        message = escape_html(message),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
