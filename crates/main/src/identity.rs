//! Who is voting.
//!
//! Signed-in voters are identified by their account's public id. Everyone
//! else gets a random identifier that is kept in a private cookie so that
//! the same browser keeps voting under the same id.

use std::time::{SystemTime, UNIX_EPOCH};

use db::user::User;
use rand::{
    rngs::{OsRng, StdRng},
    RngCore, SeedableRng,
};
use rocket::http::{Cookie, CookieJar};

pub const VOTER_COOKIE: &str = "voter_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterId(pub String);

impl VoterId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
#[error("voter id storage unavailable: {0}")]
pub struct StoreUnavailable(pub String);

/// Somewhere to keep an anonymous voter's identifier between requests.
pub trait VoterIdStore {
    fn load(&self) -> Result<Option<String>, StoreUnavailable>;
    fn save(&mut self, id: &str) -> Result<(), StoreUnavailable>;
}

pub struct CookieVoterStore<'a, 'r> {
    jar: &'a CookieJar<'r>,
}

impl<'a, 'r> CookieVoterStore<'a, 'r> {
    pub fn new(jar: &'a CookieJar<'r>) -> Self {
        CookieVoterStore { jar }
    }
}

impl VoterIdStore for CookieVoterStore<'_, '_> {
    fn load(&self) -> Result<Option<String>, StoreUnavailable> {
        Ok(self
            .jar
            .get_private(VOTER_COOKIE)
            .map(|cookie| cookie.value().trim().to_string())
            .filter(|id| !id.is_empty()))
    }

    fn save(&mut self, id: &str) -> Result<(), StoreUnavailable> {
        let mut cookie = Cookie::new(VOTER_COOKIE, id.to_string());
        cookie.make_permanent();
        self.jar.add_private(cookie);
        Ok(())
    }
}

/// Resolves the id a vote is recorded under.
///
/// If the store cannot be read or written, a fresh id is returned on every
/// call; such voters are not deduplicated across requests.
pub fn resolve_voter(
    user: Option<&User>,
    store: &mut impl VoterIdStore,
) -> VoterId {
    if let Some(user) = user {
        return VoterId(user.public_id.clone());
    }

    match store.load() {
        Ok(Some(id)) => VoterId(id),
        Ok(None) => {
            let id = new_voter_id();
            if let Err(error) = store.save(&id) {
                tracing::warn!(%error, "could not persist voter id");
            }
            VoterId(id)
        }
        Err(error) => {
            tracing::warn!(%error, "using a throw-away voter id");
            VoterId(new_voter_id())
        }
    }
}

/// A random (version 4) UUID string.
pub fn new_voter_id() -> String {
    let mut bytes = [0u8; 16];
    if let Err(error) = OsRng.try_fill_bytes(&mut bytes) {
        tracing::warn!(%error, "OS random source failed, seeding from the clock");
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        StdRng::seed_from_u64(seed).fill_bytes(&mut bytes);
    }
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryStore(Option<String>);

    impl VoterIdStore for MemoryStore {
        fn load(&self) -> Result<Option<String>, StoreUnavailable> {
            Ok(self.0.clone())
        }

        fn save(&mut self, id: &str) -> Result<(), StoreUnavailable> {
            self.0 = Some(id.to_string());
            Ok(())
        }
    }

    struct BrokenStore;

    impl VoterIdStore for BrokenStore {
        fn load(&self) -> Result<Option<String>, StoreUnavailable> {
            Err(StoreUnavailable("disabled".to_string()))
        }

        fn save(&mut self, _id: &str) -> Result<(), StoreUnavailable> {
            Err(StoreUnavailable("disabled".to_string()))
        }
    }

    fn user(public_id: &str) -> User {
        User {
            id: 1,
            public_id: public_id.to_string(),
            email: "s@example.edu".to_string(),
            student_id: "1".to_string(),
            first_name: "S".to_string(),
            last_name: "T".to_string(),
            role: "student".to_string(),
            discipline: None,
            gender: None,
            location: None,
            ug_pg: None,
            created_at: chrono::NaiveDateTime::default(),
        }
    }

    #[test]
    fn signed_in_voters_use_their_account_id() {
        let mut store = MemoryStore(Some("stored".to_string()));
        let u = user("subject-1");
        assert_eq!(resolve_voter(Some(&u), &mut store).as_str(), "subject-1");
    }

    #[test]
    fn anonymous_voters_keep_their_generated_id() {
        let mut store = MemoryStore::default();
        let first = resolve_voter(None, &mut store);
        let second = resolve_voter(None, &mut store);
        assert_eq!(first, second);
        assert_eq!(store.0.as_deref(), Some(first.as_str()));
    }

    #[test]
    fn unavailable_storage_yields_a_fresh_id_each_time() {
        let a = resolve_voter(None, &mut BrokenStore);
        let b = resolve_voter(None, &mut BrokenStore);
        assert_ne!(a, b);
    }

    #[test]
    fn generated_ids_are_v4_uuids() {
        let id = new_voter_id();
        let parsed = uuid::Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(id.len(), 36);
    }
}
