use std::collections::HashMap;

use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Deserialize;
use validator::Validate;

use madrasati_shared::errors::{AppError, AppResult, ErrorCode, FieldErrors};
use madrasati_shared::types::pagination::{Paginated, PaginationParams};

use crate::lifecycle::ReviewStatus;
use crate::models::{NewSchool, Review, School, SchoolChangeset};
use crate::rating::{round1, RatingSummary};
use crate::schema::{review_reports, reviews, school_photos, schools};
use crate::slug;
use crate::views::{PublicReview, SchoolDetail, SchoolSummary};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchoolFilter {
    pub search: Option<String>,
    pub area: Option<String>,
}

/// Editable school fields. Every field is optional so the same type serves
/// creation (where `name` is then required) and partial updates.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SchoolInput {
    pub slug: Option<String>,
    pub name: Option<String>,
    #[validate(email(message = "invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub area: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub gender_type: Option<String>,
    pub president_name: Option<String>,
    pub fees_range: Option<String>,
    pub curriculum: Option<String>,
    pub description: Option<String>,
}

fn clean(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// `None` leaves the column alone, `Some(None)` clears it.
fn patch(value: &Option<String>) -> Option<Option<String>> {
    value.as_ref().map(|_| clean(value))
}

impl SchoolInput {
    /// Applies one text field from a multipart form. Unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: String) {
        let slot = match name {
            "slug" => &mut self.slug,
            "name" => &mut self.name,
            "email" => &mut self.email,
            "phone" => &mut self.phone,
            "address" => &mut self.address,
            "area" => &mut self.area,
            "category" => &mut self.category,
            "level" => &mut self.level,
            "gender_type" => &mut self.gender_type,
            "president_name" => &mut self.president_name,
            "fees_range" => &mut self.fees_range,
            "curriculum" => &mut self.curriculum,
            "description" => &mut self.description,
            _ => return,
        };
        *slot = Some(value);
    }

    pub fn check(&self, creating: bool) -> FieldErrors {
        // A blank email is allowed and clears the column.
        let mut errors = match (clean(&self.email), self.validate()) {
            (Some(_), Err(e)) => FieldErrors::from(e),
            _ => FieldErrors::new(),
        };

        match clean(&self.name) {
            Some(name) if name.chars().count() < 2 => {
                errors.add("name", "name must be at least 2 characters")
            }
            None if creating || self.name.is_some() => errors.add("name", "name is required"),
            _ => {}
        }

        if let Some(slug) = clean(&self.slug) {
            if !slug::is_valid(&slug) {
                errors.add("slug", "slug may only contain lowercase letters, digits and dashes");
            }
        }

        errors
    }

    fn into_new_school(self, slug: String) -> NewSchool {
        NewSchool {
            slug,
            name: clean(&self.name).unwrap_or_default(),
            email: clean(&self.email).map(|e| e.to_lowercase()),
            phone: clean(&self.phone),
            address: clean(&self.address),
            area: clean(&self.area),
            category: clean(&self.category),
            level: clean(&self.level),
            gender_type: clean(&self.gender_type),
            president_name: clean(&self.president_name),
            fees_range: clean(&self.fees_range),
            curriculum: clean(&self.curriculum),
            description: clean(&self.description),
        }
    }

    fn changeset(&self, slug: Option<String>) -> SchoolChangeset {
        SchoolChangeset {
            slug,
            name: clean(&self.name),
            email: patch(&self.email).map(|e| e.map(|e| e.to_lowercase())),
            phone: patch(&self.phone),
            address: patch(&self.address),
            area: patch(&self.area),
            category: patch(&self.category),
            level: patch(&self.level),
            gender_type: patch(&self.gender_type),
            president_name: patch(&self.president_name),
            fees_range: patch(&self.fees_range),
            curriculum: patch(&self.curriculum),
            description: patch(&self.description),
            updated_at: Some(Utc::now()),
        }
    }
}

pub fn find(conn: &mut PgConnection, school_id: i64) -> AppResult<School> {
    schools::table
        .find(school_id)
        .first::<School>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::SchoolNotFound, "school not found"))
}

pub fn find_by_slug(conn: &mut PgConnection, slug: &str) -> AppResult<School> {
    schools::table
        .filter(schools::slug.eq(slug))
        .first::<School>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::SchoolNotFound, "school not found"))
}

/// The school a user administers, if any.
pub fn administered_by(conn: &mut PgConnection, user_id: i64) -> QueryResult<Option<School>> {
    schools::table
        .filter(schools::admin_user_id.eq(user_id))
        .first::<School>(conn)
        .optional()
}

/// Like [`administered_by`], failing when the admin has no school yet.
pub fn require_administered(conn: &mut PgConnection, user_id: i64) -> AppResult<School> {
    administered_by(conn, user_id)?.ok_or_else(|| {
        AppError::new(ErrorCode::NoSchoolAssigned, "no school is assigned to this account")
    })
}

pub fn load_by_ids(conn: &mut PgConnection, ids: &[i64]) -> QueryResult<HashMap<i64, School>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let found: Vec<School> = schools::table.filter(schools::id.eq_any(ids)).load(conn)?;
    Ok(found.into_iter().map(|s| (s.id, s)).collect())
}

fn filtered<'a>(filter: &SchoolFilter) -> schools::BoxedQuery<'a, Pg> {
    let mut query = schools::table.into_boxed();

    if let Some(search) = clean(&filter.search) {
        let pattern = format!("%{}%", escape_like(&search));
        query = query.filter(
            schools::name
                .ilike(pattern.clone())
                .or(schools::area.ilike(pattern)),
        );
    }
    if let Some(area) = clean(&filter.area) {
        query = query.filter(schools::area.ilike(escape_like(&area)));
    }
    query
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Public directory page with rating aggregates over approved reviews.
pub fn list(
    conn: &mut PgConnection,
    filter: &SchoolFilter,
    pagination: &PaginationParams,
) -> AppResult<Paginated<SchoolSummary>> {
    let total: i64 = filtered(filter).count().get_result(conn)?;
    let page: Vec<School> = filtered(filter)
        .order(schools::name.asc())
        .offset(pagination.offset() as i64)
        .limit(pagination.limit() as i64)
        .load(conn)?;

    let ids: Vec<i64> = page.iter().map(|s| s.id).collect();
    let ratings: Vec<(i64, Option<f64>)> = reviews::table
        .filter(reviews::school_id.eq_any(&ids))
        .filter(reviews::status.eq(ReviewStatus::Approved.as_str()))
        .select((reviews::school_id, reviews::overall_rating))
        .load(conn)?;

    let mut aggregates: HashMap<i64, (u64, f64, u64)> = HashMap::new();
    for (school_id, overall) in ratings {
        let entry = aggregates.entry(school_id).or_default();
        entry.0 += 1;
        if let Some(value) = overall {
            entry.1 += value;
            entry.2 += 1;
        }
    }

    let items = page
        .into_iter()
        .map(|school| {
            let (count, sum, rated) = aggregates.get(&school.id).copied().unwrap_or_default();
            SchoolSummary {
                average_rating: (rated > 0).then(|| round1(sum / rated as f64)),
                review_count: count,
                school,
            }
        })
        .collect();

    Ok(Paginated::new(items, total as u64, pagination))
}

pub fn approved_reviews(conn: &mut PgConnection, school_id: i64) -> QueryResult<Vec<Review>> {
    reviews::table
        .filter(reviews::school_id.eq(school_id))
        .filter(reviews::status.eq(ReviewStatus::Approved.as_str()))
        .order(reviews::created_at.desc())
        .load(conn)
}

pub fn detail(conn: &mut PgConnection, slug: &str) -> AppResult<SchoolDetail> {
    let school = find_by_slug(conn, slug)?;
    let approved = approved_reviews(conn, school.id)?;

    let rating = RatingSummary::from_ratings(approved.iter().filter_map(|r| r.ratings().complete()));
    let approved_reviews = approved.iter().map(PublicReview::from).collect();

    Ok(SchoolDetail { school, rating, approved_reviews })
}

fn slugs_with_prefix(conn: &mut PgConnection, base: &str) -> QueryResult<Vec<String>> {
    schools::table
        .filter(schools::slug.like(format!("{}%", escape_like(base))))
        .select(schools::slug)
        .load(conn)
}

fn slug_taken(conn: &mut PgConnection, slug: &str, except: Option<i64>) -> QueryResult<bool> {
    let mut query = schools::table.filter(schools::slug.eq(slug)).into_boxed();
    if let Some(id) = except {
        query = query.filter(schools::id.ne(id));
    }
    diesel::select(diesel::dsl::exists(query)).get_result(conn)
}

pub fn create(conn: &mut PgConnection, input: SchoolInput) -> AppResult<School> {
    input.check(true).into_result()?;

    let slug = match clean(&input.slug) {
        Some(explicit) => {
            if slug_taken(conn, &explicit, None)? {
                return Err(AppError::new(ErrorCode::SlugTaken, "slug is already in use"));
            }
            explicit
        }
        None => {
            let base = slug::slugify(&clean(&input.name).unwrap_or_default());
            let taken = slugs_with_prefix(conn, &base)?;
            slug::next_available(&base, &taken)
        }
    };

    let school: School = diesel::insert_into(schools::table)
        .values(&input.into_new_school(slug))
        .get_result(conn)?;

    tracing::info!(school_id = school.id, slug = %school.slug, "school created");
    Ok(school)
}

/// Partial update. School admins may not change the slug.
pub fn update(
    conn: &mut PgConnection,
    school_id: i64,
    input: &SchoolInput,
    allow_slug: bool,
) -> AppResult<School> {
    input.check(false).into_result()?;

    let slug = match clean(&input.slug) {
        Some(_) if !allow_slug => {
            return Err(AppError::field("slug", "the slug can only be changed by a super admin"))
        }
        Some(slug) => {
            if slug_taken(conn, &slug, Some(school_id))? {
                return Err(AppError::new(ErrorCode::SlugTaken, "slug is already in use"));
            }
            Some(slug)
        }
        None => None,
    };

    let updated: Option<School> = diesel::update(schools::table.find(school_id))
        .set(&input.changeset(slug))
        .get_result(conn)
        .optional()?;

    updated.ok_or_else(|| AppError::new(ErrorCode::SchoolNotFound, "school not found"))
}

pub fn set_logo(conn: &mut PgConnection, school_id: i64, key: &str, url: &str) -> AppResult<School> {
    let updated: Option<School> = diesel::update(schools::table.find(school_id))
        .set((
            schools::logo_key.eq(Some(key)),
            schools::logo_url.eq(Some(url)),
            schools::updated_at.eq(Utc::now()),
        ))
        .get_result(conn)
        .optional()?;

    updated.ok_or_else(|| AppError::new(ErrorCode::SchoolNotFound, "school not found"))
}

/// Object keys that must be removed from storage once a school is gone.
pub struct DeletedSchool {
    pub school: School,
    pub object_keys: Vec<String>,
}

/// Deletes a school with its photos, reviews and reports in one transaction.
pub fn delete(conn: &mut PgConnection, school_id: i64) -> AppResult<DeletedSchool> {
    conn.transaction::<_, AppError, _>(|conn| {
        let school = find(conn, school_id)?;

        let mut object_keys: Vec<String> = school_photos::table
            .filter(school_photos::school_id.eq(school_id))
            .select(school_photos::object_key)
            .load(conn)?;
        object_keys.extend(school.logo_key.clone());

        diesel::delete(review_reports::table.filter(review_reports::school_id.eq(school_id)))
            .execute(conn)?;
        diesel::delete(reviews::table.filter(reviews::school_id.eq(school_id))).execute(conn)?;
        diesel::delete(school_photos::table.filter(school_photos::school_id.eq(school_id)))
            .execute(conn)?;
        diesel::delete(schools::table.find(school_id)).execute(conn)?;

        Ok(DeletedSchool { school, object_keys })
    })
}

/// Outcome of an admin (re)assignment.
pub struct Assignment {
    pub school: School,
    pub previous_admin: Option<i64>,
    /// A school the admin was moved away from.
    pub released_school: Option<i64>,
}

/// Makes `admin_user_id` the only admin of `school_id`, releasing any school
/// the admin held before and displacing the school's previous admin.
pub fn assign_admin(conn: &mut PgConnection, school_id: i64, admin_user_id: i64) -> AppResult<Assignment> {
    conn.transaction::<_, AppError, _>(|conn| {
        let current = find(conn, school_id)?;

        let released: Vec<i64> = diesel::update(
            schools::table
                .filter(schools::admin_user_id.eq(admin_user_id))
                .filter(schools::id.ne(school_id)),
        )
        .set((schools::admin_user_id.eq(None::<i64>), schools::updated_at.eq(Utc::now())))
        .returning(schools::id)
        .get_results(conn)?;

        let school: School = diesel::update(schools::table.find(school_id))
            .set((schools::admin_user_id.eq(Some(admin_user_id)), schools::updated_at.eq(Utc::now())))
            .get_result(conn)?;

        Ok(Assignment {
            school,
            previous_admin: current.admin_user_id.filter(|id| *id != admin_user_id),
            released_school: released.into_iter().next(),
        })
    })
}

/// Clears the admin of a school, returning who it was.
pub fn unassign_admin(conn: &mut PgConnection, school_id: i64) -> AppResult<(School, Option<i64>)> {
    conn.transaction::<_, AppError, _>(|conn| {
        let current = find(conn, school_id)?;
        let school: School = diesel::update(schools::table.find(school_id))
            .set((schools::admin_user_id.eq(None::<i64>), schools::updated_at.eq(Utc::now())))
            .get_result(conn)?;
        Ok((school, current.admin_user_id))
    })
}
