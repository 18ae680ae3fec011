use chrono::{Datelike, Months, NaiveDate};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewProfile, Profile};
use crate::schema::profiles;

pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 100;
pub const DISPLAY_NAME_MIN: usize = 2;
pub const DISPLAY_NAME_MAX: usize = 30;
pub const BIO_MAX: usize = 500;
pub const GENDERS: [&str; 3] = ["man", "woman", "non_binary"];

/// Idempotent: the row may already exist if the registration event was
/// redelivered or onboarding raced the subscriber.
pub fn ensure_profile(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Profile> {
    diesel::insert_into(profiles::table)
        .values(&NewProfile { id: user_id })
        .on_conflict(profiles::id)
        .do_nothing()
        .execute(conn)?;

    Ok(profiles::table.find(user_id).first::<Profile>(conn)?)
}

pub fn find_profile(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Profile> {
    profiles::table
        .find(user_id)
        .first::<Profile>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))
}

/// Whole years between `birth_date` and `today`.
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> u32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

/// Inclusive birth date range for people aged `min_age..=max_age` on `today`.
pub fn birth_date_bounds(min_age: u32, max_age: u32, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let latest = today.checked_sub_months(Months::new(min_age * 12))?;
    let earliest = today
        .checked_sub_months(Months::new((max_age + 1) * 12))?
        .succ_opt()?;
    Some((earliest, latest))
}

pub fn validate_display_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if !(DISPLAY_NAME_MIN..=DISPLAY_NAME_MAX).contains(&len) {
        return Err(AppError::new(
            ErrorCode::InvalidDisplayName,
            format!("display name must be between {DISPLAY_NAME_MIN} and {DISPLAY_NAME_MAX} characters"),
        ));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '\'') {
        return Err(AppError::new(
            ErrorCode::InvalidDisplayName,
            "display name can only contain letters, numbers, spaces, hyphens and apostrophes",
        ));
    }
    Ok(name.to_string())
}

pub fn validate_birth_date(birth_date: NaiveDate, today: NaiveDate) -> AppResult<()> {
    if birth_date > today {
        return Err(AppError::new(ErrorCode::ValidationError, "birth date is in the future"));
    }
    if age_on(birth_date, today) < MIN_AGE {
        return Err(AppError::new(ErrorCode::UnderAge, "you must be at least 18 years old"));
    }
    Ok(())
}

pub fn validate_gender(gender: &str) -> AppResult<()> {
    if GENDERS.contains(&gender) {
        Ok(())
    } else {
        Err(AppError::new(
            ErrorCode::ValidationError,
            format!("gender must be one of: {}", GENDERS.join(", ")),
        ))
    }
}

/// Non-empty, known values, duplicates removed.
pub fn validate_looking_for(looking_for: &[String]) -> AppResult<Vec<String>> {
    if looking_for.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "looking_for must not be empty"));
    }
    let mut cleaned: Vec<String> = Vec::with_capacity(looking_for.len());
    for value in looking_for {
        validate_gender(value)?;
        if !cleaned.contains(value) {
            cleaned.push(value.clone());
        }
    }
    Ok(cleaned)
}

pub fn validate_bio(bio: &str) -> AppResult<()> {
    if bio.chars().count() > BIO_MAX {
        return Err(AppError::new(ErrorCode::ValidationError, "bio must be at most 500 characters"));
    }
    Ok(())
}

/// Who may view `profile`: its owner, any match, or anyone while it is
/// visible, complete and not suspended.
pub fn is_viewable(profile: &Profile, viewer: Uuid, matched: bool) -> bool {
    profile.id == viewer
        || matched
        || (profile.is_visible && profile.is_profile_complete && !profile.is_suspended)
}
