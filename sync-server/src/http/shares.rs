//! Share lookups used by client agents.

use super::ApiError;
use crate::server::Unicloud;
use crate::storage::Share;
use axum::extract::Path;
use axum::{Extension, Form, Json};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use sync_types::ShareName;

/// Form of the share existence check.
#[derive(Debug, Deserialize)]
pub struct ExistForm {
    /// Location on disk to look up.
    pub path: PathBuf,
}

/// Response of the share existence check.
#[derive(Debug, Serialize)]
pub struct ExistResponse {
    /// Name of the share registered at the path.
    pub share: ShareName,
    /// The path that was looked up.
    pub path: PathBuf,
}

fn parse_share(raw: &str) -> Result<ShareName, ApiError> {
    ShareName::new(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// `GET /shares/info/:name`
pub async fn share_info(
    Extension(engine): Extension<Arc<Unicloud>>,
    Path(name): Path<String>,
) -> Result<Json<Share>, ApiError> {
    let name = parse_share(&name)?;
    Ok(Json(engine.shares().get(&name).await?))
}

/// `GET /shares/info/:name/path`, as a plain text line.
pub async fn share_path(
    Extension(engine): Extension<Arc<Unicloud>>,
    Path(name): Path<String>,
) -> Result<String, ApiError> {
    let name = parse_share(&name)?;
    let share = engine.shares().get(&name).await?;
    Ok(format!("{}\n", share.path.display()))
}

/// `POST /shares/exist`
pub async fn share_exists(
    Extension(engine): Extension<Arc<Unicloud>>,
    Form(form): Form<ExistForm>,
) -> Result<Json<ExistResponse>, ApiError> {
    match engine.shares().by_path(&form.path).await? {
        Some(share) => Ok(Json(ExistResponse {
            share: share.name,
            path: form.path,
        })),
        None => Err(ApiError::NotFound(format!(
            "no share at {}",
            form.path.display()
        ))),
    }
}
