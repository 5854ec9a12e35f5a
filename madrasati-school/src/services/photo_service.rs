//! School logos and gallery photos stored in MinIO.

use axum::extract::Multipart;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use madrasati_shared::clients::db::{checkout, DbPool};
use madrasati_shared::clients::minio::{image_extension, MinioClient};
use madrasati_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewSchoolPhoto, School, SchoolPhoto};
use crate::schema::{school_photos, schools};
use crate::services::school_service::{self, SchoolInput};

const FILE_FIELDS: [&str; 4] = ["file", "photo", "image", "logo"];

/// An accepted image, read fully into memory.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: String,
    pub extension: &'static str,
    pub data: Vec<u8>,
}

impl ImageUpload {
    pub fn new(content_type: &str, data: Vec<u8>, max_bytes: usize) -> AppResult<Self> {
        let extension = image_extension(content_type).ok_or_else(|| {
            AppError::new(
                ErrorCode::PhotoUploadFailed,
                "unsupported image format, accepted: jpeg, png, webp, gif",
            )
        })?;

        if data.is_empty() {
            return Err(AppError::new(ErrorCode::PhotoUploadFailed, "empty file"));
        }
        if data.len() > max_bytes {
            return Err(AppError::new(
                ErrorCode::PayloadTooLarge,
                format!("image exceeds {} bytes", max_bytes),
            ));
        }

        Ok(Self { content_type: content_type.to_string(), extension, data })
    }
}

pub fn photo_key(school_id: i64, extension: &str) -> String {
    format!("schools/{}/photos/{}.{}", school_id, Uuid::now_v7(), extension)
}

pub fn logo_key(school_id: i64, extension: &str) -> String {
    format!("schools/{}/logo/{}.{}", school_id, Uuid::now_v7(), extension)
}

fn multipart_error(e: impl std::fmt::Display) -> AppError {
    AppError::new(ErrorCode::PhotoUploadFailed, format!("failed to read multipart: {e}"))
}

/// Reads the single image of an upload form.
pub async fn read_image(multipart: &mut Multipart, max_bytes: usize) -> AppResult<ImageUpload> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let is_file = field.file_name().is_some()
            || field.name().map(|n| FILE_FIELDS.contains(&n)).unwrap_or(false);
        if !is_file {
            continue;
        }

        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        return ImageUpload::new(&content_type, data.to_vec(), max_bytes);
    }

    Err(AppError::new(ErrorCode::PhotoUploadFailed, "no file provided"))
}

/// A school form sent as multipart: text fields plus an optional logo.
pub async fn read_school_form(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> AppResult<(SchoolInput, Option<ImageUpload>)> {
    let mut input = SchoolInput::default();
    let mut logo = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() || name == "logo" {
            let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
            let data = field.bytes().await.map_err(multipart_error)?;
            // Forms post an empty file part when no logo was picked.
            if !data.is_empty() {
                logo = Some(ImageUpload::new(&content_type, data.to_vec(), max_bytes)?);
            }
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        input.set_field(&name, value);
    }

    Ok((input, logo))
}

pub fn list(conn: &mut PgConnection, school_id: i64) -> QueryResult<Vec<SchoolPhoto>> {
    school_photos::table
        .filter(school_photos::school_id.eq(school_id))
        .order(school_photos::created_at.asc())
        .load(conn)
}

fn store_failed(e: String) -> AppError {
    tracing::error!(error = %e, "object storage failure");
    AppError::new(ErrorCode::PhotoUploadFailed, "image storage failed")
}

/// Removes an object, logging rather than failing when storage refuses.
pub async fn discard(minio: &MinioClient, key: &str) {
    if let Err(e) = minio.delete(key).await {
        tracing::warn!(error = %e, key = %key, "failed to delete stored object");
    }
}

fn check_capacity(count: i64, gallery_limit: i64) -> AppResult<()> {
    if count >= gallery_limit {
        return Err(AppError::new(
            ErrorCode::PhotoLimitReached,
            format!("a school gallery holds at most {gallery_limit} photos"),
        ));
    }
    Ok(())
}

fn gallery_size(conn: &mut PgConnection, school_id: i64) -> QueryResult<i64> {
    school_photos::table
        .filter(school_photos::school_id.eq(school_id))
        .count()
        .get_result(conn)
}

/// Counts and inserts while holding the school row lock, so concurrent
/// uploads to one gallery are serialized against the cap.
fn insert_within_cap(conn: &mut PgConnection, photo: &NewSchoolPhoto, gallery_limit: i64) -> AppResult<SchoolPhoto> {
    conn.transaction::<_, AppError, _>(|conn| {
        schools::table
            .find(photo.school_id)
            .select(schools::id)
            .for_update()
            .first::<i64>(conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::SchoolNotFound, "school not found"))?;

        check_capacity(gallery_size(conn, photo.school_id)?, gallery_limit)?;

        Ok(diesel::insert_into(school_photos::table)
            .values(photo)
            .get_result::<SchoolPhoto>(conn)?)
    })
}

pub async fn add_photo(
    db: &DbPool,
    minio: &MinioClient,
    school_id: i64,
    gallery_limit: i64,
    upload: ImageUpload,
) -> AppResult<SchoolPhoto> {
    // Fail fast on a full gallery; the binding check happens under the lock.
    {
        let mut conn = checkout(db)?;
        check_capacity(gallery_size(&mut conn, school_id)?, gallery_limit)?;
    }

    let key = photo_key(school_id, upload.extension);
    let stored = minio
        .upload(&key, upload.data, &upload.content_type)
        .await
        .map_err(store_failed)?;

    let inserted = checkout(db).and_then(|mut conn| {
        let photo = NewSchoolPhoto { school_id, object_key: stored.key.clone(), url: stored.url };
        insert_within_cap(&mut conn, &photo, gallery_limit)
    });

    match inserted {
        Ok(photo) => {
            tracing::info!(school_id, photo_id = photo.id, "school photo uploaded");
            Ok(photo)
        }
        Err(e) => {
            discard(minio, &stored.key).await;
            Err(e)
        }
    }
}

pub async fn delete_photo(db: &DbPool, minio: &MinioClient, school_id: i64, photo_id: i64) -> AppResult<()> {
    let photo = {
        let mut conn = checkout(db)?;
        let photo = school_photos::table
            .filter(school_photos::id.eq(photo_id))
            .filter(school_photos::school_id.eq(school_id))
            .first::<SchoolPhoto>(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::PhotoNotFound, "photo not found"))?;

        diesel::delete(school_photos::table.find(photo.id)).execute(&mut conn)?;
        photo
    };

    discard(minio, &photo.object_key).await;
    tracing::info!(school_id, photo_id, "school photo deleted");
    Ok(())
}

/// Uploads a new logo, then removes the previous object.
pub async fn replace_logo(
    db: &DbPool,
    minio: &MinioClient,
    school: &School,
    upload: ImageUpload,
) -> AppResult<School> {
    let key = logo_key(school.id, upload.extension);
    let stored = minio
        .upload(&key, upload.data, &upload.content_type)
        .await
        .map_err(store_failed)?;

    let updated = {
        let mut conn = checkout(db)?;
        school_service::set_logo(&mut conn, school.id, &stored.key, &stored.url)
    };

    match updated {
        Ok(updated) => {
            if let Some(old) = &school.logo_key {
                discard(minio, old).await;
            }
            tracing::info!(school_id = school.id, "school logo updated");
            Ok(updated)
        }
        Err(e) => {
            discard(minio, &stored.key).await;
            Err(e)
        }
    }
}
