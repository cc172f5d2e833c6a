//! Client page
//!
//! Serves the browser client with the signaling endpoint's URL and the ICE
//! servers filled in.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::Html,
    routing::get,
    Router,
};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use crate::http::{AppResult, AppState};

const INDEX_TEMPLATE: &str = include_str!("../../templates/index.html");

/// Settings handed to the page script
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig<'a> {
    pub signaling_url: &'a str,
    pub ice_servers: Vec<IceServer<'a>>,
}

#[derive(Debug, Serialize)]
pub struct IceServer<'a> {
    pub urls: &'a [String],
}

impl<'a> ClientConfig<'a> {
    pub fn new(signaling_url: &'a str, ice_servers: &'a [String]) -> Self {
        let ice_servers = if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![IceServer { urls: ice_servers }]
        };
        Self {
            signaling_url,
            ice_servers,
        }
    }

    /// JSON object literal safe to place inside a `<script>` element
    fn to_script_literal(&self) -> serde_json::Result<String> {
        Ok(serde_json::to_string(self)?.replace('<', "\\u003c"))
    }
}

/// Renders the client page
pub struct IndexPage {
    handlebars: Handlebars<'static>,
}

impl IndexPage {
    pub fn new() -> anyhow::Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars
            .register_template_string("index", INDEX_TEMPLATE)
            .map_err(|e| anyhow::anyhow!("Failed to register index template: {e}"))?;

        Ok(Self { handlebars })
    }

    /// Render the page for `client`
    pub fn render(&self, client: &ClientConfig<'_>) -> AppResult<String> {
        let literal = client.to_script_literal()?;
        Ok(self
            .handlebars
            .render("index", &json!({ "client_config": literal }))?)
    }
}

/// Client page router
pub fn create_index_router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// Signaling URL for a page served under `host`
pub fn signaling_url(public_ws_url: Option<&str>, host: &str) -> String {
    public_ws_url.map_or_else(|| format!("ws://{host}/websocket"), ToString::to_string)
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Html<String>> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");

    let url = signaling_url(state.public_ws_url.as_deref(), host);
    let client = ClientConfig::new(&url, &state.ice_servers);
    Ok(Html(state.index_page.render(&client)?))
}
