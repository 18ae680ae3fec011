pub mod discover;
pub mod health;
pub mod matches;
pub mod photos;
pub mod profile;
pub mod swipes;
pub mod verification;
