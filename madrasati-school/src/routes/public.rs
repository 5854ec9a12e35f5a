use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::errors::AppResult;
use madrasati_shared::types::pagination::{Paginated, PaginationParams};
use madrasati_shared::types::ApiResponse;

use crate::models::SchoolPhoto;
use crate::services::school_service::{self, SchoolFilter};
use crate::services::photo_service;
use crate::views::{SchoolDetail, SchoolSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SchoolListParams {
    pub search: Option<String>,
    pub area: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl SchoolListParams {
    pub fn split(self) -> (SchoolFilter, PaginationParams) {
        (
            SchoolFilter { search: self.search, area: self.area },
            PaginationParams::new(self.page, self.per_page),
        )
    }
}

pub async fn list_schools(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SchoolListParams>,
) -> AppResult<Json<ApiResponse<Paginated<SchoolSummary>>>> {
    let (filter, pagination) = params.split();
    let mut conn = db::checkout(&state.db)?;
    let page = school_service::list(&mut conn, &filter, &pagination)?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn get_school(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> AppResult<Json<ApiResponse<SchoolDetail>>> {
    let mut conn = db::checkout(&state.db)?;
    let detail = school_service::detail(&mut conn, &slug)?;
    Ok(Json(ApiResponse::ok(detail)))
}

pub async fn school_photos(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<SchoolPhoto>>>> {
    let mut conn = db::checkout(&state.db)?;
    let school = school_service::find_by_slug(&mut conn, &slug)?;
    let photos = photo_service::list(&mut conn, school.id)?;
    Ok(Json(ApiResponse::ok(photos)))
}
