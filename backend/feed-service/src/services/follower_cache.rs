//! Short-lived follower snapshots.
//!
//! Follower sets are read from the profile service on a miss and kept for a
//! fixed TTL. Entries expire lazily on access; a background sweep drops the
//! ones nobody touches again. Follow/unfollow/block events patch live
//! entries in place so fan-out sees the change before the TTL runs out.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clients::ProfileClient;
use crate::error::Result;
use crate::metrics::feed as feed_metrics;
use crate::models::AuthToken;
use crate::utils::clock::SharedClock;

#[derive(Debug, Clone)]
struct FollowerSnapshot {
    follower_ids: HashSet<Uuid>,
    expires_at: DateTime<Utc>,
}

pub struct FollowerSnapshotCache {
    profiles: Arc<dyn ProfileClient>,
    clock: SharedClock,
    ttl: ChronoDuration,
    entries: DashMap<Uuid, FollowerSnapshot>,
}

impl FollowerSnapshotCache {
    pub fn new(profiles: Arc<dyn ProfileClient>, clock: SharedClock, ttl: Duration) -> Self {
        Self {
            profiles,
            clock,
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::minutes(10)),
            entries: DashMap::new(),
        }
    }

    /// Cached follower set for `owner`, fetched from the profile service on a miss.
    pub async fn get_followers(&self, owner: Uuid, auth: &AuthToken) -> Result<HashSet<Uuid>> {
        let now = self.clock.now();
        if let Some(ids) = self.live_snapshot(owner, now) {
            feed_metrics::record_follower_cache("hit");
            return Ok(ids);
        }
        feed_metrics::record_follower_cache("miss");

        let follower_ids: HashSet<Uuid> = self
            .profiles
            .get_followers(owner, auth)
            .await?
            .into_iter()
            .collect();

        // An unauthenticated lookup always comes back empty; caching it would
        // hide real followers until the TTL expires.
        if auth.as_str().is_some() {
            self.entries.insert(
                owner,
                FollowerSnapshot {
                    follower_ids: follower_ids.clone(),
                    expires_at: self.clock.now() + self.ttl,
                },
            );
        }
        debug!(owner = %owner, followers = follower_ids.len(), "Loaded follower snapshot");
        Ok(follower_ids)
    }

    /// Followings are never cached; rebuilds always see the current graph.
    pub async fn get_followings(
        &self,
        owner: Uuid,
        limit: usize,
        auth: &AuthToken,
    ) -> Result<Vec<Uuid>> {
        self.profiles.get_followings(owner, limit, auth).await
    }

    /// Passthrough, like followings.
    pub async fn get_blocked(&self, owner: Uuid, auth: &AuthToken) -> Result<HashSet<Uuid>> {
        Ok(self
            .profiles
            .get_blocked(owner, auth)
            .await?
            .into_iter()
            .collect())
    }

    pub fn add_follower(&self, owner: Uuid, follower: Uuid) {
        let now = self.clock.now();
        if let Some(mut snapshot) = self.entries.get_mut(&owner) {
            if snapshot.expires_at > now {
                snapshot.follower_ids.insert(follower);
            }
        }
    }

    pub fn remove_follower(&self, owner: Uuid, follower: Uuid) {
        let now = self.clock.now();
        if let Some(mut snapshot) = self.entries.get_mut(&owner) {
            if snapshot.expires_at > now {
                snapshot.follower_ids.remove(&follower);
            }
        }
    }

    pub fn invalidate(&self, owner: Uuid) {
        self.entries.remove(&owner);
    }

    /// Drop every expired snapshot. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, snapshot| snapshot.expires_at > now);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            feed_metrics::record_follower_cache_evictions(evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown` flips to true.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Starting follower cache sweeper");
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Follower cache sweeper shutting down");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let evicted = self.sweep();
                        if evicted > 0 {
                            debug!(evicted, remaining = self.len(), "Swept follower snapshots");
                        }
                    }
                }
            }
        })
    }

    fn live_snapshot(&self, owner: Uuid, now: DateTime<Utc>) -> Option<HashSet<Uuid>> {
        let expired = match self.entries.get(&owner) {
            Some(snapshot) if snapshot.expires_at > now => {
                return Some(snapshot.follower_ids.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(&owner, |_, snapshot| snapshot.expires_at <= now);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockProfileClient;
    use crate::utils::clock::ManualClock;
    use mockall::predicate::eq;

    fn cache_with(
        profiles: MockProfileClient,
        clock: &ManualClock,
    ) -> FollowerSnapshotCache {
        FollowerSnapshotCache::new(
            Arc::new(profiles),
            Arc::new(clock.clone()),
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn hit_avoids_profile_call() {
        let owner = Uuid::new_v4();
        let follower = Uuid::new_v4();
        let mut profiles = MockProfileClient::new();
        profiles
            .expect_get_followers()
            .with(eq(owner), mockall::predicate::always())
            .times(1)
            .returning(move |_, _| Ok(vec![follower]));

        let clock = ManualClock::new(Utc::now());
        let cache = cache_with(profiles, &clock);
        let auth = AuthToken::bearer("t");

        assert!(cache.get_followers(owner, &auth).await.unwrap().contains(&follower));
        assert!(cache.get_followers(owner, &auth).await.unwrap().contains(&follower));
    }

    #[tokio::test]
    async fn expired_snapshot_is_refetched() {
        let owner = Uuid::new_v4();
        let mut profiles = MockProfileClient::new();
        profiles
            .expect_get_followers()
            .times(2)
            .returning(|_, _| Ok(vec![Uuid::new_v4()]));

        let clock = ManualClock::new(Utc::now());
        let cache = cache_with(profiles, &clock);
        let auth = AuthToken::bearer("t");

        cache.get_followers(owner, &auth).await.unwrap();
        clock.advance(ChronoDuration::minutes(9));
        cache.get_followers(owner, &auth).await.unwrap();
        clock.advance(ChronoDuration::minutes(2));
        cache.get_followers(owner, &auth).await.unwrap();
    }

    #[tokio::test]
    async fn add_and_remove_patch_live_entries_only() {
        let owner = Uuid::new_v4();
        let newcomer = Uuid::new_v4();
        let mut profiles = MockProfileClient::new();
        profiles
            .expect_get_followers()
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let clock = ManualClock::new(Utc::now());
        let cache = cache_with(profiles, &clock);
        let auth = AuthToken::bearer("t");

        // absent entry: no-op, no fetch
        cache.add_follower(owner, newcomer);
        assert!(cache.is_empty());

        cache.get_followers(owner, &auth).await.unwrap();
        cache.add_follower(owner, newcomer);
        assert!(cache.get_followers(owner, &auth).await.unwrap().contains(&newcomer));

        cache.remove_follower(owner, newcomer);
        assert!(cache.get_followers(owner, &auth).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let mut profiles = MockProfileClient::new();
        profiles.expect_get_followers().returning(|_, _| Ok(Vec::new()));

        let clock = ManualClock::new(Utc::now());
        let cache = cache_with(profiles, &clock);
        let auth = AuthToken::bearer("t");

        cache.get_followers(Uuid::new_v4(), &auth).await.unwrap();
        clock.advance(ChronoDuration::minutes(5));
        cache.get_followers(Uuid::new_v4(), &auth).await.unwrap();
        clock.advance(ChronoDuration::minutes(6));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn unauthenticated_results_are_not_cached() {
        let mut profiles = MockProfileClient::new();
        profiles
            .expect_get_followers()
            .times(2)
            .returning(|_, _| Ok(Vec::new()));

        let clock = ManualClock::new(Utc::now());
        let cache = cache_with(profiles, &clock);
        let owner = Uuid::new_v4();

        cache.get_followers(owner, &AuthToken::none()).await.unwrap();
        cache.get_followers(owner, &AuthToken::none()).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let profiles = MockProfileClient::new();
        let clock = ManualClock::new(Utc::now());
        let cache = Arc::new(cache_with(profiles, &clock));
        let (tx, rx) = watch::channel(false);

        let handle = cache.spawn_sweeper(Duration::from_millis(10), rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
