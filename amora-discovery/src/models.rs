use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{matches, profiles, swipes};

// --- Profile ---

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub looking_for: Vec<String>,
    pub photos: Vec<String>,
    pub is_visible: bool,
    pub is_profile_complete: bool,
    pub is_suspended: bool,
    #[serde(skip_serializing)]
    pub suspension_reason: Option<String>,
    pub verification_status: String,
    #[serde(skip_serializing)]
    pub verification_photo_url: Option<String>,
    #[serde(skip_serializing)]
    pub verification_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub id: Uuid,
}

#[derive(Debug, AsChangeset, Deserialize, Default)]
#[diesel(table_name = profiles)]
pub struct UpdateProfile {
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub looking_for: Option<Vec<String>>,
    pub is_visible: Option<bool>,
}

/// What other users get to see.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileCard {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub age: Option<u32>,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub photos: Vec<String>,
    pub is_verified: bool,
}

impl ProfileCard {
    pub fn from_profile(profile: Profile, today: NaiveDate) -> Self {
        Self {
            id: profile.id,
            age: profile.birth_date.map(|b| crate::services::profile_service::age_on(b, today)),
            display_name: profile.display_name,
            bio: profile.bio,
            gender: profile.gender,
            photos: profile.photos,
            is_verified: profile.verification_status == "verified",
        }
    }
}

// --- Swipe ---

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = swipes)]
pub struct Swipe {
    pub id: Uuid,
    pub swiper_id: Uuid,
    pub swiped_id: Uuid,
    pub direction: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = swipes)]
pub struct NewSwipe<'a> {
    pub swiper_id: Uuid,
    pub swiped_id: Uuid,
    pub direction: &'a str,
}

// --- Match ---

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = matches)]
pub struct Match {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn other_participant(&self, user_id: Uuid) -> Uuid {
        if self.user_a == user_id { self.user_b } else { self.user_a }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = matches)]
pub struct NewMatch {
    pub user_a: Uuid,
    pub user_b: Uuid,
}
