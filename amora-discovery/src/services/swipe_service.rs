//! Swipe recording and match detection.
//!
//! A swipe, its quota charge and the match it may complete are written in one
//! transaction. Two locks keep that correct under concurrency: the swiper's
//! subscription row (serializes one user's swipes, so quota cannot be
//! overspent) and a transaction-scoped advisory lock on the unordered pair (so
//! when both users like each other at the same moment, the second transaction
//! sees the first one's swipe and creates the match).

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use amora_shared::entitlement::{self, Entitlement, QuotaAction, QuotaPolicy, Remaining};
use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewMatch, NewSwipe};
use crate::schema::{matches, profiles, swipes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeDirection {
    Pass,
    Like,
    SuperLike,
}

impl SwipeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwipeDirection::Pass => "pass",
            SwipeDirection::Like => "like",
            SwipeDirection::SuperLike => "super_like",
        }
    }

    /// Like and super like both count towards a match.
    pub fn is_positive(&self) -> bool {
        !matches!(self, SwipeDirection::Pass)
    }
}

impl std::str::FromStr for SwipeDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(SwipeDirection::Pass),
            "like" => Ok(SwipeDirection::Like),
            "super_like" => Ok(SwipeDirection::SuperLike),
            _ => Err(AppError::new(
                ErrorCode::InvalidSwipeDirection,
                "direction must be one of: pass, like, super_like",
            )),
        }
    }
}

/// The two users of a match, smaller id first, so one row stands for the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchPair {
    pub user_a: Uuid,
    pub user_b: Uuid,
}

impl MatchPair {
    pub fn new(x: Uuid, y: Uuid) -> Self {
        if x <= y {
            Self { user_a: x, user_b: y }
        } else {
            Self { user_a: y, user_b: x }
        }
    }

    /// Key for `pg_advisory_xact_lock`. Collisions only serialize unrelated pairs.
    pub fn lock_key(&self) -> i64 {
        let folded = self.user_a.as_u128() ^ self.user_b.as_u128().rotate_left(64);
        ((folded >> 64) as u64 ^ folded as u64) as i64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProfileState {
    pub is_visible: bool,
    pub is_profile_complete: bool,
    pub is_suspended: bool,
}

impl ProfileState {
    fn is_discoverable(&self) -> bool {
        self.is_visible && self.is_profile_complete && !self.is_suspended
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SwipeOutcome {
    /// False when this exact swipe already existed; nothing was written.
    pub recorded: bool,
    pub is_match: bool,
    pub match_id: Option<Uuid>,
    pub swipes_remaining: Remaining,
    /// True only for the call that created the match row.
    #[serde(skip)]
    pub match_created: bool,
}

pub trait SwipeStore {
    fn profile_state(&mut self, user_id: Uuid) -> AppResult<Option<ProfileState>>;
    fn lock_entitlement(&mut self, user_id: Uuid, now: DateTime<Utc>, policy: &QuotaPolicy) -> AppResult<Entitlement>;
    fn save_entitlement(&mut self, entitlement: &Entitlement) -> AppResult<()>;
    fn lock_pair(&mut self, pair: MatchPair) -> AppResult<()>;
    fn find_swipe(&mut self, swiper: Uuid, swiped: Uuid) -> AppResult<Option<SwipeDirection>>;
    /// False when the (swiper, swiped) row already exists.
    fn insert_swipe(&mut self, swiper: Uuid, swiped: Uuid, direction: SwipeDirection) -> AppResult<bool>;
    fn find_match(&mut self, pair: MatchPair) -> AppResult<Option<Uuid>>;
    /// Returns the match id and whether this call created it.
    fn insert_match_if_absent(&mut self, pair: MatchPair) -> AppResult<(Uuid, bool)>;
}

/// Run inside one transaction; see the module docs.
pub fn record_swipe<S: SwipeStore>(
    store: &mut S,
    actor: Uuid,
    target: Uuid,
    direction: SwipeDirection,
    now: DateTime<Utc>,
    policy: &QuotaPolicy,
) -> AppResult<SwipeOutcome> {
    if actor == target {
        return Err(AppError::new(ErrorCode::CannotSwipeSelf, "you cannot swipe on yourself"));
    }

    let me = store
        .profile_state(actor)?
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))?;
    if me.is_suspended {
        return Err(AppError::new(ErrorCode::ProfileSuspended, "your profile is suspended"));
    }
    if !me.is_profile_complete {
        return Err(AppError::new(ErrorCode::OnboardingIncomplete, "complete onboarding before swiping"));
    }

    store
        .profile_state(target)?
        .filter(ProfileState::is_discoverable)
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))?;

    let mut entitlement = store.lock_entitlement(actor, now, policy)?;
    let pair = MatchPair::new(actor, target);
    store.lock_pair(pair)?;

    if store.find_swipe(actor, target)?.is_some() {
        let match_id = store.find_match(pair)?;
        return Ok(SwipeOutcome {
            recorded: false,
            is_match: match_id.is_some(),
            match_id,
            swipes_remaining: entitlement.swipes_remaining,
            match_created: false,
        });
    }

    let unspent = entitlement.swipes_remaining;
    let swipes_remaining = entitlement.charge(QuotaAction::Swipe, policy)?;
    if !store.insert_swipe(actor, target, direction)? {
        let match_id = store.find_match(pair)?;
        return Ok(SwipeOutcome {
            recorded: false,
            is_match: match_id.is_some(),
            match_id,
            swipes_remaining: unspent,
            match_created: false,
        });
    }
    store.save_entitlement(&entitlement)?;

    if direction.is_positive() {
        let reciprocal = store.find_swipe(target, actor)?;
        if reciprocal.is_some_and(|d| d.is_positive()) {
            let (match_id, created) = store.insert_match_if_absent(pair)?;
            return Ok(SwipeOutcome {
                recorded: true,
                is_match: true,
                match_id: Some(match_id),
                swipes_remaining,
                match_created: created,
            });
        }
    }

    Ok(SwipeOutcome {
        recorded: true,
        is_match: false,
        match_id: None,
        swipes_remaining,
        match_created: false,
    })
}

pub fn is_matched<S: SwipeStore>(store: &mut S, a: Uuid, b: Uuid) -> AppResult<bool> {
    Ok(a != b && store.find_match(MatchPair::new(a, b))?.is_some())
}

// --- Postgres ---

pub struct PgSwipeStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgSwipeStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl SwipeStore for PgSwipeStore<'_> {
    fn profile_state(&mut self, user_id: Uuid) -> AppResult<Option<ProfileState>> {
        let row = profiles::table
            .find(user_id)
            .select((profiles::is_visible, profiles::is_profile_complete, profiles::is_suspended))
            .first::<(bool, bool, bool)>(self.conn)
            .optional()?;

        Ok(row.map(|(is_visible, is_profile_complete, is_suspended)| ProfileState {
            is_visible,
            is_profile_complete,
            is_suspended,
        }))
    }

    fn lock_entitlement(&mut self, user_id: Uuid, now: DateTime<Utc>, policy: &QuotaPolicy) -> AppResult<Entitlement> {
        Ok(entitlement::db::lock_for_update(self.conn, user_id, now, policy)?)
    }

    fn save_entitlement(&mut self, entitlement: &Entitlement) -> AppResult<()> {
        Ok(entitlement::db::save(self.conn, entitlement)?)
    }

    fn lock_pair(&mut self, pair: MatchPair) -> AppResult<()> {
        diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
            .bind::<BigInt, _>(pair.lock_key())
            .execute(self.conn)?;
        Ok(())
    }

    fn find_swipe(&mut self, swiper: Uuid, swiped: Uuid) -> AppResult<Option<SwipeDirection>> {
        let direction = swipes::table
            .filter(swipes::swiper_id.eq(swiper))
            .filter(swipes::swiped_id.eq(swiped))
            .select(swipes::direction)
            .first::<String>(self.conn)
            .optional()?;

        direction.map(|d| d.parse()).transpose()
    }

    fn insert_swipe(&mut self, swiper: Uuid, swiped: Uuid, direction: SwipeDirection) -> AppResult<bool> {
        let inserted = diesel::insert_into(swipes::table)
            .values(&NewSwipe {
                swiper_id: swiper,
                swiped_id: swiped,
                direction: direction.as_str(),
            })
            .on_conflict((swipes::swiper_id, swipes::swiped_id))
            .do_nothing()
            .execute(self.conn)?;
        Ok(inserted == 1)
    }

    fn find_match(&mut self, pair: MatchPair) -> AppResult<Option<Uuid>> {
        Ok(matches::table
            .filter(matches::user_a.eq(pair.user_a))
            .filter(matches::user_b.eq(pair.user_b))
            .select(matches::id)
            .first::<Uuid>(self.conn)
            .optional()?)
    }

    fn insert_match_if_absent(&mut self, pair: MatchPair) -> AppResult<(Uuid, bool)> {
        let created = diesel::insert_into(matches::table)
            .values(&NewMatch {
                user_a: pair.user_a,
                user_b: pair.user_b,
            })
            .on_conflict((matches::user_a, matches::user_b))
            .do_nothing()
            .returning(matches::id)
            .get_result::<Uuid>(self.conn)
            .optional()?;

        match created {
            Some(id) => Ok((id, true)),
            None => {
                let id = self
                    .find_match(pair)?
                    .ok_or_else(|| AppError::new(ErrorCode::MatchNotFound, "match disappeared"))?;
                Ok((id, false))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amora_shared::entitlement::Tier;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        profiles: HashMap<Uuid, ProfileState>,
        entitlements: HashMap<Uuid, Entitlement>,
        swipes: HashMap<(Uuid, Uuid), SwipeDirection>,
        matches: HashMap<MatchPair, Uuid>,
    }

    impl MemoryStore {
        fn add_user(&mut self) -> Uuid {
            let id = Uuid::new_v4();
            self.profiles.insert(
                id,
                ProfileState {
                    is_visible: true,
                    is_profile_complete: true,
                    is_suspended: false,
                },
            );
            id
        }

        fn swipe_count(&self) -> usize {
            self.swipes.len()
        }
    }

    impl SwipeStore for MemoryStore {
        fn profile_state(&mut self, user_id: Uuid) -> AppResult<Option<ProfileState>> {
            Ok(self.profiles.get(&user_id).copied())
        }

        fn lock_entitlement(&mut self, user_id: Uuid, now: DateTime<Utc>, policy: &QuotaPolicy) -> AppResult<Entitlement> {
            let current = self
                .entitlements
                .entry(user_id)
                .or_insert_with(|| Entitlement::free(user_id, now, policy))
                .clone();
            Ok(current.refreshed(now, policy))
        }

        fn save_entitlement(&mut self, entitlement: &Entitlement) -> AppResult<()> {
            self.entitlements.insert(entitlement.user_id, entitlement.clone());
            Ok(())
        }

        fn lock_pair(&mut self, _pair: MatchPair) -> AppResult<()> {
            Ok(())
        }

        fn find_swipe(&mut self, swiper: Uuid, swiped: Uuid) -> AppResult<Option<SwipeDirection>> {
            Ok(self.swipes.get(&(swiper, swiped)).copied())
        }

        fn insert_swipe(&mut self, swiper: Uuid, swiped: Uuid, direction: SwipeDirection) -> AppResult<bool> {
            if self.swipes.contains_key(&(swiper, swiped)) {
                return Ok(false);
            }
            self.swipes.insert((swiper, swiped), direction);
            Ok(true)
        }

        fn find_match(&mut self, pair: MatchPair) -> AppResult<Option<Uuid>> {
            Ok(self.matches.get(&pair).copied())
        }

        fn insert_match_if_absent(&mut self, pair: MatchPair) -> AppResult<(Uuid, bool)> {
            if let Some(id) = self.matches.get(&pair) {
                return Ok((*id, false));
            }
            let id = Uuid::new_v4();
            self.matches.insert(pair, id);
            Ok((id, true))
        }
    }

    fn policy() -> QuotaPolicy {
        QuotaPolicy {
            free_daily_swipes: 3,
            free_daily_messages: 3,
            reset_window_hours: 24,
        }
    }

    fn swipe(store: &mut MemoryStore, a: Uuid, b: Uuid, d: SwipeDirection) -> AppResult<SwipeOutcome> {
        record_swipe(store, a, b, d, Utc::now(), &policy())
    }

    #[test]
    fn mutual_like_matches_in_either_order() {
        for first_is_a in [true, false] {
            let mut store = MemoryStore::default();
            let a = store.add_user();
            let b = store.add_user();
            let (first, second) = if first_is_a { (a, b) } else { (b, a) };

            let one = swipe(&mut store, first, second, SwipeDirection::Like).unwrap();
            assert!(one.recorded);
            assert!(!one.is_match);
            assert!(!is_matched(&mut store, a, b).unwrap());

            let two = swipe(&mut store, second, first, SwipeDirection::SuperLike).unwrap();
            assert!(two.is_match);
            assert!(two.match_created);
            assert!(is_matched(&mut store, a, b).unwrap());
            assert!(is_matched(&mut store, b, a).unwrap());
            assert_eq!(store.matches.len(), 1);
        }
    }

    #[test]
    fn one_sided_like_or_pass_does_not_match() {
        let mut store = MemoryStore::default();
        let a = store.add_user();
        let b = store.add_user();
        let c = store.add_user();

        swipe(&mut store, a, b, SwipeDirection::Like).unwrap();
        assert!(!is_matched(&mut store, a, b).unwrap());

        swipe(&mut store, a, c, SwipeDirection::Pass).unwrap();
        let back = swipe(&mut store, c, a, SwipeDirection::Like).unwrap();
        assert!(!back.is_match);
        assert!(store.matches.is_empty());
    }

    #[test]
    fn repeated_swipe_is_not_duplicated_and_reports_state() {
        let mut store = MemoryStore::default();
        let a = store.add_user();
        let b = store.add_user();
        swipe(&mut store, b, a, SwipeDirection::Like).unwrap();
        let first = swipe(&mut store, a, b, SwipeDirection::Like).unwrap();
        assert_eq!(first.swipes_remaining, Remaining::Limited(2));

        let again = swipe(&mut store, a, b, SwipeDirection::Like).unwrap();
        assert!(!again.recorded);
        assert!(again.is_match);
        assert_eq!(again.match_id, first.match_id);
        assert!(!again.match_created);
        // no quota spent on the replay
        assert_eq!(again.swipes_remaining, Remaining::Limited(2));
        assert_eq!(store.swipe_count(), 2);
    }

    #[test]
    fn exhausted_quota_refuses_without_writing() {
        let mut store = MemoryStore::default();
        let a = store.add_user();
        let targets: Vec<Uuid> = (0..4).map(|_| store.add_user()).collect();

        for target in &targets[..3] {
            swipe(&mut store, a, *target, SwipeDirection::Pass).unwrap();
        }
        let err = swipe(&mut store, a, targets[3], SwipeDirection::Like).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::QuotaExceeded));
        assert_eq!(store.swipe_count(), 3);
        assert_eq!(store.entitlements[&a].swipes_remaining, Remaining::Limited(0));
    }

    #[test]
    fn premium_swipes_are_unlimited() {
        let mut store = MemoryStore::default();
        let a = store.add_user();
        let now = Utc::now();
        store.entitlements.insert(
            a,
            Entitlement::free(a, now, &policy()).activate(Tier::Premium, now + chrono::Duration::days(30)),
        );

        for _ in 0..10 {
            let target = store.add_user();
            let outcome = swipe(&mut store, a, target, SwipeDirection::Like).unwrap();
            assert_eq!(outcome.swipes_remaining, Remaining::Unlimited);
        }
    }

    #[test]
    fn refusals() {
        let mut store = MemoryStore::default();
        let a = store.add_user();
        let b = store.add_user();

        let err = swipe(&mut store, a, a, SwipeDirection::Like).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CannotSwipeSelf));

        let err = swipe(&mut store, a, Uuid::new_v4(), SwipeDirection::Like).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProfileNotFound));

        store.profiles.get_mut(&b).unwrap().is_visible = false;
        let err = swipe(&mut store, a, b, SwipeDirection::Like).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProfileNotFound));

        store.profiles.get_mut(&b).unwrap().is_visible = true;
        store.profiles.get_mut(&b).unwrap().is_suspended = true;
        let err = swipe(&mut store, a, b, SwipeDirection::Like).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProfileNotFound));

        let c = store.add_user();
        store.profiles.get_mut(&a).unwrap().is_suspended = true;
        let err = swipe(&mut store, a, c, SwipeDirection::Like).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProfileSuspended));

        store.profiles.get_mut(&a).unwrap().is_suspended = false;
        store.profiles.get_mut(&a).unwrap().is_profile_complete = false;
        let err = swipe(&mut store, a, c, SwipeDirection::Like).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::OnboardingIncomplete));

        assert_eq!(store.swipe_count(), 0);
    }

    #[test]
    fn direction_parsing() {
        assert_eq!("super_like".parse::<SwipeDirection>().unwrap(), SwipeDirection::SuperLike);
        let err = "maybe".parse::<SwipeDirection>().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidSwipeDirection));
    }

    #[test]
    fn pair_is_canonical() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(MatchPair::new(a, b), MatchPair::new(b, a));
        assert_eq!(MatchPair::new(a, b).lock_key(), MatchPair::new(b, a).lock_key());
        let pair = MatchPair::new(a, b);
        assert!(pair.user_a <= pair.user_b);
    }
}
