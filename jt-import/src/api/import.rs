//! Import trigger endpoint

use axum::{body::Bytes, extract::State, Json};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::services::ImportSummary;
use crate::AppState;

/// POST /import/run request body
///
/// `timestamp` and `hash` are consumed by the auth middleware. Paths are
/// optional; relative ones resolve against the root folder.
#[derive(Debug, Default, Deserialize)]
pub struct RunImportRequest {
    #[serde(default)]
    pub organizations_path: Option<PathBuf>,
    #[serde(default)]
    pub postings_path: Option<PathBuf>,
}

/// POST /import/run
///
/// 200 with `{organizationsImported, jobsImported}`; 404 when either file is
/// missing; 409 when a run is already in progress; 500 on processing failure.
pub async fn run_import(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ImportSummary>> {
    let request: RunImportRequest = if body.is_empty() {
        RunImportRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?
    };

    let _running = state
        .import_running
        .try_lock()
        .map_err(|_| ApiError::Conflict("An import run is already in progress".to_string()))?;

    let settings = state.orchestrator.settings();
    let organizations_path = resolve_path(
        &state.root_folder,
        request.organizations_path,
        settings.organizations_path(&state.root_folder),
    );
    let postings_path = resolve_path(
        &state.root_folder,
        request.postings_path,
        settings.postings_path(&state.root_folder),
    );

    info!(
        organizations = %organizations_path.display(),
        postings = %postings_path.display(),
        "Import triggered via API"
    );

    match state.orchestrator.run(&organizations_path, &postings_path).await {
        Ok(summary) => {
            *state.last_error.write().await = None;
            Ok(Json(summary))
        }
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            Err(e.into())
        }
    }
}

fn resolve_path(root: &Path, requested: Option<PathBuf>, default: PathBuf) -> PathBuf {
    match requested {
        Some(path) if path.is_absolute() => path,
        Some(path) => root.join(path),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        let root = Path::new("/srv/jt");
        let default = PathBuf::from("/srv/jt/Data/companies.csv");

        assert_eq!(resolve_path(root, None, default.clone()), default);
        assert_eq!(
            resolve_path(root, Some(PathBuf::from("seed/orgs.csv")), default.clone()),
            PathBuf::from("/srv/jt/seed/orgs.csv")
        );
        assert_eq!(
            resolve_path(root, Some(PathBuf::from("/tmp/orgs.csv")), default),
            PathBuf::from("/tmp/orgs.csv")
        );
    }
}
