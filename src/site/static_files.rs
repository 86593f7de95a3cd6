use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use mime_guess::from_path;
use rust_embed::RustEmbed;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::SiteState;

#[derive(RustEmbed)]
#[folder = "public/"]
pub struct Pages;

const INDEX: &str = "index.html";

/// Candidate files for a request path, most specific first.
/// `/services` tries `services.html` before falling back to the index page.
fn candidates(path: &str) -> Vec<String> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return vec![INDEX.to_string()];
    }
    if Path::new(path).extension().is_some() {
        return vec![path.to_string()];
    }
    vec![
        format!("{path}.html"),
        format!("{path}/{INDEX}"),
        INDEX.to_string(),
    ]
}

fn is_safe(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

fn file_response(path: &str, data: Vec<u8>) -> Response {
    let mime = from_path(path).first_or_octet_stream();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        data,
    )
        .into_response()
}

/// Serve marketing pages from `FRONTEND_STATIC_DIR` when set, else from the binary
pub async fn serve_site(State(state): State<Arc<SiteState>>, uri: Uri) -> Response {
    for candidate in candidates(uri.path()) {
        if !is_safe(&candidate) {
            break;
        }

        if let Some(dir) = &state.static_dir {
            let file_path = PathBuf::from(dir).join(&candidate);
            if let Ok(content) = tokio::fs::read(&file_path).await {
                return file_response(&candidate, content);
            }
        }

        if let Some(content) = Pages::get(&candidate) {
            return file_response(&candidate, content.data.into_owned());
        }
    }

    (StatusCode::NOT_FOUND, "404 Not Found").into_response()
}
