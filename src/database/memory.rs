//! In-memory store mirroring the PostgreSQL behaviour, for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::{Result, ServerError};
use crate::module_info::ModuleInfo;
use crate::token::{Scope, Token, TokenRepository};
use crate::user::{User, UserRepository};

#[derive(Debug, Clone)]
struct TokenRow {
    user_id: i64,
    scope: Scope,
    expiry: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    tokens: HashMap<String, TokenRow>,
    next_module_id: i64,
    modules: BTreeMap<i64, ModuleInfo>,
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    tables: Mutex<Tables>,
    fail_candidates: AtomicBool,
    fail_reissue: Mutex<HashSet<i64>>,
    fail_token_insert: AtomicBool,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tables: Mutex::new(Tables::default()),
            fail_candidates: AtomicBool::new(false),
            fail_reissue: Mutex::new(HashSet::new()),
            fail_token_insert: AtomicBool::new(false),
        }
    }

    /// Make the sweeper candidate query fail.
    pub fn fail_candidates(&self, fail: bool) {
        self.fail_candidates.store(fail, Ordering::SeqCst);
    }

    /// Make every token insert fail.
    pub fn fail_token_insert(&self, fail: bool) {
        self.fail_token_insert.store(fail, Ordering::SeqCst);
    }

    /// Make token replacement fail for `user_id`.
    pub fn fail_reissue_for(&self, user_id: i64) {
        self.fail_reissue.lock().unwrap().insert(user_id);
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.tables.lock().unwrap().tokens.contains_key(hash)
    }

    pub fn token_count(&self, user_id: i64, scope: Scope) -> usize {
        self.tables
            .lock()
            .unwrap()
            .tokens
            .values()
            .filter(|row| row.user_id == user_id && row.scope == scope)
            .count()
    }

    /// Latest expiry among the tokens of `scope` owned by `user_id`.
    pub fn latest_expiry(&self, user_id: i64, scope: Scope) -> Option<DateTime<Utc>> {
        self.tables
            .lock()
            .unwrap()
            .tokens
            .values()
            .filter(|row| row.user_id == user_id && row.scope == scope)
            .map(|row| row.expiry)
            .max()
    }
}

impl Tables {
    fn email_taken(&self, email: &str, except: i64) -> bool {
        self.users
            .values()
            .any(|user| user.id != except && user.email == email)
    }

    fn insert_user(&mut self, user: &mut User, now: DateTime<Utc>) -> Result<()> {
        user.password.persisted_hash();
        if self.email_taken(&user.email, 0) {
            return Err(ServerError::DuplicateEmail);
        }

        self.next_id += 1;
        user.id = self.next_id;
        user.created_at = now;
        user.updated_at = now;
        user.version = 1;
        self.users.insert(user.id, user.clone());

        Ok(())
    }

    fn remove_tokens(&mut self, scope: Scope, user_id: i64) {
        self.tokens
            .retain(|_, row| !(row.user_id == user_id && row.scope == scope));
    }

    fn insert_token(&mut self, token: &Token) -> Result<()> {
        if !self.users.contains_key(&token.user_id) {
            return Err(ServerError::Internal {
                details: format!("token owner {} does not exist", token.user_id),
                source: None,
            });
        }
        self.tokens.insert(
            token.hash.clone(),
            TokenRow {
                user_id: token.user_id,
                scope: token.scope,
                expiry: token.expiry,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &mut User) -> Result<()> {
        self.tables.lock().unwrap().insert_user(user, self.clock.now())
    }

    async fn insert_with_token(&self, user: &mut User, token: &mut Token) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.insert_user(user, self.clock.now())?;

        token.user_id = user.id;
        if self.fail_token_insert.load(Ordering::SeqCst) {
            tables.users.remove(&user.id);
            return Err(ServerError::Timeout);
        }
        tables.insert_token(token)
    }

    async fn get(&self, id: i64) -> Result<User> {
        if id < 1 {
            return Err(ServerError::NotFound);
        }
        self.tables
            .lock()
            .unwrap()
            .users
            .get(&id)
            .cloned()
            .ok_or(ServerError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User> {
        self.tables
            .lock()
            .unwrap()
            .users
            .values()
            .find(|user| user.email == email)
            .cloned()
            .ok_or(ServerError::NotFound)
    }

    async fn list(&self) -> Result<Vec<User>> {
        Ok(self.tables.lock().unwrap().users.values().cloned().collect())
    }

    async fn update(&self, user: &mut User) -> Result<()> {
        user.password.persisted_hash();
        let mut tables = self.tables.lock().unwrap();
        let current = match tables.users.get(&user.id) {
            Some(current) if current.version == user.version => current.version,
            _ => return Err(ServerError::EditConflict),
        };
        if tables.email_taken(&user.email, user.id) {
            return Err(ServerError::DuplicateEmail);
        }

        user.version = current + 1;
        user.updated_at = self.clock.now();
        tables.users.insert(user.id, user.clone());

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if id < 1 || tables.users.remove(&id).is_none() {
            return Err(ServerError::NotFound);
        }
        tables.tokens.retain(|_, row| row.user_id != id);

        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, hash: &str, now: DateTime<Utc>) -> Result<User> {
        let tables = self.tables.lock().unwrap();
        tables
            .tokens
            .get(hash)
            .filter(|row| row.scope == scope && row.expiry > now)
            .and_then(|row| tables.users.get(&row.user_id))
            .cloned()
            .ok_or(ServerError::NotFound)
    }

    async fn find_unactivated_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>> {
        if self.fail_candidates.load(Ordering::SeqCst) {
            return Err(ServerError::Timeout);
        }

        let tables = self.tables.lock().unwrap();
        let mut latest: BTreeMap<i64, DateTime<Utc>> = BTreeMap::new();
        for row in tables.tokens.values().filter(|row| row.scope == Scope::Activation) {
            let entry = latest.entry(row.user_id).or_insert(row.expiry);
            *entry = (*entry).max(row.expiry);
        }

        Ok(latest
            .into_iter()
            .filter(|(_, expiry)| *expiry < cutoff)
            .filter_map(|(id, _)| tables.users.get(&id))
            .filter(|user| !user.activated)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert(&self, token: &Token) -> Result<()> {
        if self.fail_token_insert.load(Ordering::SeqCst) {
            return Err(ServerError::Timeout);
        }
        self.tables.lock().unwrap().insert_token(token)
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<()> {
        self.tables.lock().unwrap().remove_tokens(scope, user_id);
        Ok(())
    }

    async fn replace_all_for_user(&self, token: &Token) -> Result<()> {
        if self.fail_reissue.lock().unwrap().contains(&token.user_id) {
            return Err(ServerError::Timeout);
        }

        let mut tables = self.tables.lock().unwrap();
        tables.remove_tokens(token.scope, token.user_id);
        tables.insert_token(token)
    }
}

#[async_trait]
impl crate::module_info::ModuleInfoRepository for MemoryStore {
    async fn insert(&self, module: &mut ModuleInfo) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_module_id += 1;
        let now = self.clock.now();
        module.id = tables.next_module_id;
        module.created_at = now;
        module.updated_at = now;
        module.version = 1;
        tables.modules.insert(module.id, module.clone());

        Ok(())
    }

    async fn get(&self, id: i64) -> Result<ModuleInfo> {
        if id < 1 {
            return Err(ServerError::NotFound);
        }
        self.tables
            .lock()
            .unwrap()
            .modules
            .get(&id)
            .cloned()
            .ok_or(ServerError::NotFound)
    }

    async fn list(&self) -> Result<Vec<ModuleInfo>> {
        Ok(self.tables.lock().unwrap().modules.values().cloned().collect())
    }

    async fn update(&self, module: &mut ModuleInfo) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        match tables.modules.get(&module.id) {
            Some(current) if current.version == module.version => {},
            _ => return Err(ServerError::EditConflict),
        }

        module.version += 1;
        module.updated_at = self.clock.now();
        tables.modules.insert(module.id, module.clone());

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if id < 1 || tables.modules.remove(&id).is_none() {
            return Err(ServerError::NotFound);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::clock::FixedClock;
    use crate::user::Credential;

    fn user(email: &str) -> User {
        User::new(
            "Edsger".into(),
            "Dijkstra".into(),
            email.into(),
            Credential::Hashed("$argon2id$stub".into()),
        )
    }

    #[tokio::test]
    async fn test_version_guard() {
        let store = MemoryStore::new(Arc::new(FixedClock::default()));
        let mut first = user("edsger@example.com");
        UserRepository::insert(&store, &mut first).await.unwrap();

        let mut stale = store.get(first.id).await.unwrap();
        first.fname = "E.".into();
        store.update(&mut first).await.unwrap();
        assert_eq!(first.version, 2);

        stale.fname = "W.".into();
        assert!(matches!(store.update(&mut stale).await, Err(ServerError::EditConflict)));
        assert_eq!(store.get(first.id).await.unwrap().fname, "E.");

        // Re-reading then re-applying the change succeeds.
        let mut fresh = store.get(first.id).await.unwrap();
        fresh.fname = "W.".into();
        store.update(&mut fresh).await.unwrap();
        assert_eq!(fresh.version, 3);
        assert_eq!(UserRepository::get(&store, first.id).await.unwrap().fname, "W.");
    }

    #[tokio::test]
    async fn test_concurrent_updates() {
        let store = MemoryStore::new(Arc::new(FixedClock::default()));
        let mut original = user("grace@example.com");
        UserRepository::insert(&store, &mut original).await.unwrap();

        let mut left = original.clone();
        let mut right = original.clone();
        left.fname = "Left".into();
        right.fname = "Right".into();

        let (left_result, right_result) =
            tokio::join!(store.update(&mut left), store.update(&mut right));
        let conflicts = [&left_result, &right_result]
            .iter()
            .filter(|result| matches!(result, Err(ServerError::EditConflict)))
            .count();
        assert_eq!(conflicts, 1);
        assert!(left_result.is_ok() || right_result.is_ok());

        let stored = UserRepository::get(&store, original.id).await.unwrap();
        assert_eq!(stored.version, 2);
        let winner = if left_result.is_ok() { "Left" } else { "Right" };
        assert_eq!(stored.fname, winner);
    }

    #[tokio::test]
    async fn test_insert_with_token_is_atomic() {
        let clock = Arc::new(FixedClock::default());
        let store = MemoryStore::new(clock.clone());

        store.fail_token_insert(true);
        let mut failed = user("ada@example.com");
        let mut token =
            Token::generate(0, Duration::seconds(20), Scope::Activation, clock.now()).unwrap();
        assert!(store.insert_with_token(&mut failed, &mut token).await.is_err());
        assert!(UserRepository::list(&store).await.unwrap().is_empty());
        assert!(!store.contains_hash(&token.hash));

        store.fail_token_insert(false);
        let mut retried = user("ada@example.com");
        store.insert_with_token(&mut retried, &mut token).await.unwrap();
        assert_eq!(token.user_id, retried.id);
        assert_eq!(store.token_count(retried.id, Scope::Activation), 1);
    }

    #[tokio::test]
    async fn test_candidates_use_newest_token() {
        let clock = Arc::new(FixedClock::default());
        let store = MemoryStore::new(clock.clone());
        let mut pending = user("pending@example.com");
        UserRepository::insert(&store, &mut pending).await.unwrap();

        let now = clock.now();
        let old =
            Token::generate(pending.id, Duration::seconds(-60), Scope::Activation, now).unwrap();
        let fresh =
            Token::generate(pending.id, Duration::seconds(60), Scope::Activation, now).unwrap();
        TokenRepository::insert(&store, &old).await.unwrap();
        TokenRepository::insert(&store, &fresh).await.unwrap();

        assert!(store.find_unactivated_expired(now).await.unwrap().is_empty());

        store.delete_all_for_user(Scope::Activation, pending.id).await.unwrap();
        TokenRepository::insert(&store, &old).await.unwrap();
        let candidates = store.find_unactivated_expired(now).await.unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_tokens() {
        let clock = Arc::new(FixedClock::default());
        let store = MemoryStore::new(clock.clone());
        let mut owner = user("owner@example.com");
        UserRepository::insert(&store, &mut owner).await.unwrap();

        let token = Token::generate(
            owner.id,
            Duration::hours(1),
            Scope::Authentication,
            clock.now(),
        )
        .unwrap();
        TokenRepository::insert(&store, &token).await.unwrap();
        store.delete(owner.id).await.unwrap();

        assert!(!store.contains_hash(&token.hash));
        assert!(matches!(store.delete(owner.id).await, Err(ServerError::NotFound)));
    }
}
