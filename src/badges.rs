//! Lead-source badge resolution backed by a shared, per-credential TTL cache.

use crate::mapping::parse_pipe_lines;
use crate::models::Badge;
use crate::sm8_client::ServiceM8Client;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

const CACHE_KEY_PREFIX: &str = "servicem8_badges:";

/// Badge lists keyed by hashed credential.
///
/// Shared by every pipeline run. Concurrent misses for the same credential
/// may each fetch; the last insert wins.
#[derive(Clone)]
pub struct BadgeCache {
    entries: Cache<String, Arc<Vec<Badge>>>,
    enabled: bool,
}

impl BadgeCache {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        let entries = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(1_000)
            .build();
        Self { entries, enabled }
    }

    /// Cache key for a credential. The credential itself is never stored.
    pub fn cache_key(credential: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(credential.as_bytes());
        format!("{}{}", CACHE_KEY_PREFIX, hex::encode(hasher.finalize()))
    }

    /// Returns the badges visible to the client's credential.
    ///
    /// Never fails: a fetch error is logged and yields an empty list, which is
    /// not cached.
    pub async fn get_badges(&self, client: &ServiceM8Client) -> Arc<Vec<Badge>> {
        let key = Self::cache_key(client.api_key());

        if self.enabled {
            if let Some(cached) = self.entries.get(&key).await {
                tracing::debug!("Badge cache hit ({} badges)", cached.len());
                return cached;
            }
        }

        match client.list_badges().await {
            Ok(badges) => {
                let badges = Arc::new(badges);
                if self.enabled {
                    self.entries.insert(key, badges.clone()).await;
                    tracing::debug!("Badge cache refreshed ({} badges)", badges.len());
                }
                badges
            }
            Err(e) => {
                tracing::warn!("Failed to fetch badges: {}", e);
                Arc::new(Vec::new())
            }
        }
    }

    /// Drops the entry for a credential.
    pub async fn invalidate(&self, credential: &str) {
        self.entries.invalidate(&Self::cache_key(credential)).await;
        tracing::info!("Badge cache invalidated for credential change");
    }
}

/// Looks up the badge display name configured for a lead-source value.
/// First exact, case-sensitive match wins.
pub fn badge_name_for(source_value: &str, mapping_text: &str) -> Option<String> {
    parse_pipe_lines(mapping_text)
        .into_iter()
        .find(|(value, _)| value == source_value)
        .map(|(_, name)| name)
}

/// Resolves a lead-source value to a badge uuid, if one is configured and
/// exists remotely.
pub async fn resolve_badge(
    cache: &BadgeCache,
    client: &ServiceM8Client,
    source_value: &str,
    mapping_text: &str,
) -> Option<String> {
    if source_value.trim().is_empty() {
        return None;
    }

    let badge_name = badge_name_for(source_value, mapping_text)?;
    let badges = cache.get_badges(client).await;

    let found = badges
        .iter()
        .find(|badge| badge.name.as_deref() == Some(badge_name.as_str()))
        .map(|badge| badge.uuid.clone());

    if found.is_none() {
        tracing::warn!("Badge '{}' not found in remote badge list", badge_name);
    }
    found
}
