use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::schema::profiles;
use crate::services::profile_service;
use crate::AppState;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct PhotosResponse {
    pub photos: Vec<String>,
}

/// A validated image read from the first multipart field.
pub struct UploadedImage {
    pub content_type: String,
    pub extension: &'static str,
    pub data: Vec<u8>,
}

pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

pub async fn read_image(multipart: &mut Multipart) -> AppResult<UploadedImage> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::new(ErrorCode::PhotoUploadFailed, format!("failed to read multipart: {e}")))?
        .ok_or_else(|| AppError::new(ErrorCode::PhotoUploadFailed, "no file provided"))?;

    let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
    let extension = image_extension(&content_type).ok_or_else(|| {
        AppError::new(ErrorCode::PhotoUploadFailed, "unsupported image format, accepted: jpeg, png, webp")
    })?;

    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::new(ErrorCode::PhotoUploadFailed, format!("failed to read file data: {e}")))?;
    if data.is_empty() {
        return Err(AppError::new(ErrorCode::PhotoUploadFailed, "file is empty"));
    }
    if data.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::new(ErrorCode::PayloadTooLarge, "photo must be at most 10 MiB"));
    }

    Ok(UploadedImage {
        content_type,
        extension,
        data: data.to_vec(),
    })
}

fn photo_limit_error(max: usize) -> AppError {
    AppError::new(ErrorCode::PhotoLimitReached, format!("a profile can hold at most {max} photos"))
}

// --- POST /photos ---

pub async fn upload_photo(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<PhotosResponse>>> {
    let max_photos = state.config.max_photos;
    {
        let mut conn = db::conn(&state.db)?;
        let profile = profile_service::ensure_profile(&mut conn, user.id)?;
        if profile.photos.len() >= max_photos {
            return Err(photo_limit_error(max_photos));
        }
    }

    let image = read_image(&mut multipart).await?;
    let key = format!("profiles/{}/{}.{}", user.id, Uuid::now_v7(), image.extension);
    let photo_url = state
        .storage
        .upload(&key, image.data, &image.content_type)
        .await
        .map_err(|e| AppError::new(ErrorCode::PhotoUploadFailed, e))?;

    // Re-check under the row lock; concurrent uploads may have filled the slots
    let mut conn = db::conn(&state.db)?;
    let appended = conn.transaction::<_, AppError, _>(|conn| {
        let mut photos = profiles::table
            .find(user.id)
            .select(profiles::photos)
            .for_update()
            .first::<Vec<String>>(conn)?;
        if photos.len() >= max_photos {
            return Ok(None);
        }
        photos.push(photo_url.clone());
        diesel::update(profiles::table.find(user.id))
            .set((profiles::photos.eq(&photos), profiles::updated_at.eq(Utc::now())))
            .execute(conn)?;
        Ok(Some(photos))
    })?;

    let Some(photos) = appended else {
        if let Err(e) = state.storage.delete(&key).await {
            tracing::warn!(error = %e, key = %key, "failed to remove rejected photo");
        }
        return Err(photo_limit_error(max_photos));
    };

    tracing::info!(user_id = %user.id, photo_url = %photo_url, "profile photo uploaded");

    Ok(Json(ApiResponse::ok(PhotosResponse { photos })))
}

// --- DELETE /photos ---

#[derive(Debug, Deserialize)]
pub struct DeletePhotoRequest {
    pub url: String,
}

pub async fn delete_photo(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeletePhotoRequest>,
) -> AppResult<Json<ApiResponse<PhotosResponse>>> {
    let mut conn = db::conn(&state.db)?;
    let photos = conn.transaction::<_, AppError, _>(|conn| {
        let mut photos = profiles::table
            .find(user.id)
            .select(profiles::photos)
            .for_update()
            .first::<Vec<String>>(conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))?;

        let before = photos.len();
        photos.retain(|p| p != &req.url);
        if photos.len() == before {
            return Err(AppError::not_found("photo not found on this profile"));
        }

        diesel::update(profiles::table.find(user.id))
            .set((profiles::photos.eq(&photos), profiles::updated_at.eq(Utc::now())))
            .execute(conn)?;
        Ok(photos)
    })?;

    match state.storage.key_from_url(&req.url) {
        Some(key) => {
            if let Err(e) = state.storage.delete(key).await {
                tracing::warn!(error = %e, key = %key, "failed to delete photo object");
            }
        }
        None => tracing::warn!(url = %req.url, "photo url outside storage bucket, object left in place"),
    }

    tracing::info!(user_id = %user.id, "profile photo removed");

    Ok(Json(ApiResponse::ok(PhotosResponse { photos })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_common_web_formats_are_accepted() {
        assert_eq!(image_extension("image/jpeg"), Some("jpg"));
        assert_eq!(image_extension("image/png"), Some("png"));
        assert_eq!(image_extension("image/webp"), Some("webp"));
        assert_eq!(image_extension("image/gif"), None);
        assert_eq!(image_extension("application/pdf"), None);
    }
}
