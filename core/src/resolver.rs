//! Saved-recipe resolution.
//!
//! Joins a user's saved recipe ids against the recipe lookup client to
//! produce display rows. A failed store query fails the whole call; a failed
//! lookup only ever turns its own row into a placeholder.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Recipe, RecipeSummary, ResolvedRecipe, SavedRecipeRef, Session};

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const MAX_CONCURRENCY: usize = 16;
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
#[error("saved-recipe store unavailable: {0:#}")]
pub struct StoreError(pub anyhow::Error);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("recipe '{0}' not found")]
    NotFound(String),
    #[error("recipe lookup failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

/// Where saved `(user, recipe)` pairs live.
pub trait SavedRecipeStore {
    /// Saved refs for `user_id`, in insertion order.
    fn list_saved(&self, user_id: i64) -> Result<Vec<SavedRecipeRef>, StoreError>;
}

impl<T: SavedRecipeStore> SavedRecipeStore for Mutex<T> {
    fn list_saved(&self, user_id: i64) -> Result<Vec<SavedRecipeRef>, StoreError> {
        let store = self.lock().unwrap_or_else(PoisonError::into_inner);
        store.list_saved(user_id)
    }
}

/// External recipe API.
///
/// The CLI implements this with reqwest against TheMealDB; tests use
/// in-memory fakes.
#[async_trait]
pub trait RecipeLookup: Send + Sync {
    async fn lookup(&self, recipe_id: &str) -> Result<Recipe, LookupError>;
    async fn search(&self, query: &str) -> Result<Vec<RecipeSummary>, LookupError>;
}

/// Exponential backoff for transport failures. `NotFound` is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per lookup, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on any single backoff sleep.
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped
    /// at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << retry.min(16))
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(200),
            max_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct SavedRecipeResolver<'a, L: ?Sized> {
    lookup: &'a L,
    config: ResolverConfig,
}

impl<'a, L: RecipeLookup + ?Sized> SavedRecipeResolver<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self::with_config(lookup, ResolverConfig::default())
    }

    /// Concurrency is clamped to `1..=MAX_CONCURRENCY`.
    pub fn with_config(lookup: &'a L, config: ResolverConfig) -> Self {
        let config = ResolverConfig {
            concurrency: config.concurrency.clamp(1, MAX_CONCURRENCY),
            ..config
        };
        Self { lookup, config }
    }

    #[must_use]
    pub fn config(&self) -> ResolverConfig {
        self.config
    }

    /// Resolve every recipe the session's user has saved.
    ///
    /// Without a session the result is empty and the store is not touched.
    pub async fn resolve<S: SavedRecipeStore + ?Sized>(
        &self,
        store: &S,
        session: Option<&Session>,
    ) -> Result<Vec<ResolvedRecipe>, ResolveError> {
        let Some(session) = session else {
            return Ok(Vec::new());
        };

        let refs = store.list_saved(session.user_id)?;
        debug!(
            user_id = session.user_id,
            count = refs.len(),
            "resolving saved recipes"
        );
        Ok(self.resolve_refs(&refs).await)
    }

    /// Look up every ref with bounded concurrency. The output has one entry
    /// per ref, in ref order.
    pub async fn resolve_refs(&self, refs: &[SavedRecipeRef]) -> Vec<ResolvedRecipe> {
        let mut slots: Vec<Option<ResolvedRecipe>> = vec![None; refs.len()];

        let lookups: Vec<_> = refs
            .iter()
            .enumerate()
            .map(|(idx, saved)| async move { (idx, self.resolve_one(&saved.recipe_id).await) })
            .collect();
        let mut completed = stream::iter(lookups).buffer_unordered(self.config.concurrency);

        while let Some((idx, resolved)) = completed.next().await {
            slots[idx] = Some(resolved);
        }

        slots
            .into_iter()
            .zip(refs)
            .map(|(slot, saved)| {
                slot.unwrap_or_else(|| ResolvedRecipe::placeholder(&saved.recipe_id))
            })
            .collect()
    }

    async fn resolve_one(&self, recipe_id: &str) -> ResolvedRecipe {
        match self.lookup_with_retry(recipe_id).await {
            Ok(recipe) => ResolvedRecipe::found(recipe_id, recipe),
            Err(LookupError::NotFound(_)) => {
                debug!(recipe_id, "saved recipe not found, using placeholder");
                ResolvedRecipe::placeholder(recipe_id)
            }
            Err(LookupError::Transport(message)) => {
                warn!(
                    recipe_id,
                    attempts = self.config.retry.max_attempts.max(1),
                    error = %message,
                    "saved recipe lookup failed, using placeholder"
                );
                ResolvedRecipe::placeholder(recipe_id)
            }
        }
    }

    async fn lookup_with_retry(&self, recipe_id: &str) -> Result<Recipe, LookupError> {
        let retry = self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.lookup.lookup(recipe_id).await {
                Err(LookupError::Transport(message)) if attempt < max_attempts => {
                    let delay = retry.delay_for(attempt - 1);
                    debug!(recipe_id, attempt, ?delay, error = %message, "retrying lookup");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
