//! Directional and time-bucket key queries over a listing-only store.
//!
//! The store lists object names in ascending order, one page at a time.
//! [`KeyPager`] turns that into a lazy, restartable sequence of decoded
//! keys; [`BoundedKeySet`] accumulates them under a count and an upper
//! bound; [`ContentQueries`] composes the two into forward, backward and
//! bucket queries.

use super::{
    ContentStore, ListRequest, StorageError, channel_prefix, list_with_retry, object_name,
    parse_object_name,
};
use crate::clock::TimeSource;
use crate::config::QuerySettings;
use crate::model::{ContentKey, DirectionQuery, TimeQuery, TimeUnit};
use std::collections::BTreeSet;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, trace};

/// Lazy pages of keys under one prefix.
pub struct KeyPager<'a> {
    store: &'a dyn ContentStore,
    channel: String,
    prefix: String,
    start_marker: Option<String>,
    marker: Option<String>,
    page_size: usize,
    exhausted: bool,
    last_seen: Option<ContentKey>,
}

impl<'a> KeyPager<'a> {
    pub fn new(
        store: &'a dyn ContentStore,
        channel: &str,
        prefix: String,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            channel: channel.to_owned(),
            prefix,
            start_marker: None,
            marker: None,
            page_size: page_size.max(1),
            exhausted: false,
            last_seen: None,
        }
    }

    /// Begin listing strictly after `marker`.
    pub fn starting_after(mut self, marker: String) -> Self {
        self.start_marker = Some(marker.clone());
        self.marker = Some(marker);
        self
    }

    /// Rewind to the first page.
    pub fn restart(&mut self) {
        self.marker = self.start_marker.clone();
        self.exhausted = false;
        self.last_seen = None;
    }

    /// The greatest key decoded so far.
    pub fn last_seen(&self) -> Option<&ContentKey> {
        self.last_seen.as_ref()
    }

    /// The next page of decoded keys, or `None` once the listing is done.
    /// Names that do not decode are skipped.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ContentKey>>, StorageError> {
        if self.exhausted {
            return Ok(None);
        }
        let listing = list_with_retry(
            self.store,
            ListRequest {
                prefix: self.prefix.clone(),
                marker: self.marker.clone(),
                max_keys: self.page_size,
            },
        )
        .await?;

        match listing.next_marker() {
            Some(marker) => self.marker = Some(marker.to_owned()),
            None => self.exhausted = true,
        }

        let keys: Vec<ContentKey> = listing
            .entries
            .iter()
            .filter_map(|name| {
                let key = parse_object_name(&self.channel, name);
                if key.is_none() {
                    trace!(%name, "Skipping listed object that is not a content key");
                }
                key
            })
            .collect();
        if let Some(last) = keys.last() {
            self.last_seen = Some(last.clone());
        }
        Ok(Some(keys))
    }
}

/// Ordered keys capped by count and by an inclusive upper bound.
#[derive(Debug, Clone)]
pub struct BoundedKeySet {
    keys: BTreeSet<ContentKey>,
    max: usize,
    limit: ContentKey,
}

impl BoundedKeySet {
    pub fn new(max: usize, limit: ContentKey) -> Self {
        Self {
            keys: BTreeSet::new(),
            max,
            limit,
        }
    }

    /// Add a key. Returns `false`, leaving the set untouched, if the key is
    /// past the limit or the set is full.
    pub fn insert(&mut self, key: ContentKey) -> bool {
        if key > self.limit || self.keys.len() >= self.max {
            return false;
        }
        self.keys.insert(key);
        true
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.keys.len() >= self.max
    }

    pub fn limit(&self) -> &ContentKey {
        &self.limit
    }

    pub fn into_keys(self) -> BTreeSet<ContentKey> {
        self.keys
    }
}

/// Query engine shared by the channel service and the delivery loops.
#[derive(Clone)]
pub struct ContentQueries {
    store: Arc<dyn ContentStore>,
    times: TimeSource,
    settings: QuerySettings,
}

impl ContentQueries {
    pub fn new(store: Arc<dyn ContentStore>, times: TimeSource, settings: QuerySettings) -> Self {
        Self {
            store,
            times,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn times(&self) -> &TimeSource {
        &self.times
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Greatest key that a stable read may return.
    fn stable_limit(&self) -> ContentKey {
        ContentKey::last_key(self.times.stable() - Duration::milliseconds(1))
    }

    /// Keys in the time bucket of `query.start_time`.
    pub async fn query_by_time(
        &self,
        query: &TimeQuery,
    ) -> Result<BTreeSet<ContentKey>, StorageError> {
        if query.count == 0 {
            return Ok(BTreeSet::new());
        }
        let bucket_start = query.unit.truncate(query.start_time);
        let mut limit = query.limit_key.clone().unwrap_or_else(|| {
            ContentKey::last_key(bucket_start + query.unit.duration() - Duration::milliseconds(1))
        });
        if query.stable {
            limit = limit.min(self.stable_limit());
        }
        let prefix = format!(
            "{}{}",
            channel_prefix(&query.channel_name),
            query.unit.format(bucket_start)
        );
        let pager = KeyPager::new(
            self.store.as_ref(),
            &query.channel_name,
            prefix,
            self.settings.list_page_size,
        );
        let keys = self
            .collect_forward(pager, BoundedKeySet::new(query.count, limit))
            .await?;
        debug!(
            channel = %query.channel_name,
            unit = ?query.unit,
            found = keys.len(),
            "Time query"
        );
        Ok(keys)
    }

    /// Up to `count` keys strictly after `query.start_key`.
    pub async fn query_next(
        &self,
        query: &DirectionQuery,
    ) -> Result<BTreeSet<ContentKey>, StorageError> {
        if query.count == 0 {
            return Ok(BTreeSet::new());
        }
        let limit = if query.stable {
            self.stable_limit()
        } else {
            ContentKey::last_key(self.times.latest_limit(false))
        };
        if query.start_key >= limit {
            return Ok(BTreeSet::new());
        }
        let pager = KeyPager::new(
            self.store.as_ref(),
            &query.channel_name,
            channel_prefix(&query.channel_name),
            self.settings.list_page_size.min(query.count.max(1)),
        )
        .starting_after(object_name(&query.channel_name, &query.start_key));
        self.collect_forward(pager, BoundedKeySet::new(query.count, limit))
            .await
    }

    /// Up to `count` keys strictly before `query.start_key`.
    ///
    /// Listing only runs forwards, so buckets are visited backwards: the
    /// hours of the start key's day, then whole days, until enough keys
    /// are found or the scan passes the TTL and lookback floor.
    pub async fn query_previous(
        &self,
        query: &DirectionQuery,
    ) -> Result<BTreeSet<ContentKey>, StorageError> {
        if query.count == 0 {
            return Ok(BTreeSet::new());
        }
        let start = query.start_key.time();
        let lookback = start - Duration::days(i64::from(self.settings.previous_lookback_days));
        let floor = self.times.earliest_time(query.ttl_days).max(lookback);

        let mut found = BTreeSet::new();
        let day_start = TimeUnit::Days.truncate(start);
        let mut hour = TimeUnit::Hours.truncate(start);
        while hour >= day_start && hour + TimeUnit::Hours.duration() > floor {
            self.collect_bucket(query, TimeUnit::Hours, hour, &mut found).await?;
            if found.len() >= query.count {
                return Ok(found);
            }
            hour -= TimeUnit::Hours.duration();
        }

        let mut day = day_start - TimeUnit::Days.duration();
        while day + TimeUnit::Days.duration() > floor {
            self.collect_bucket(query, TimeUnit::Days, day, &mut found).await?;
            if found.len() >= query.count {
                break;
            }
            day -= TimeUnit::Days.duration();
        }
        Ok(found)
    }

    /// Drain a forward pager into `set`, stopping at the first rejected
    /// key, at the safety ceiling, or once the listing passes the limit.
    async fn collect_forward(
        &self,
        mut pager: KeyPager<'_>,
        mut set: BoundedKeySet,
    ) -> Result<BTreeSet<ContentKey>, StorageError> {
        let limit_time = set.limit().time();
        while let Some(keys) = pager.next_page().await? {
            let mut rejected = false;
            for key in keys {
                if !set.insert(key) {
                    rejected = true;
                    break;
                }
            }
            let past_limit = pager
                .last_seen()
                .is_some_and(|last| last.time() >= limit_time);
            if rejected || set.len() >= self.settings.max_list_items || past_limit {
                break;
            }
        }
        Ok(set.into_keys())
    }

    /// Add the keys of one bucket that precede the start key, keeping only
    /// the greatest `count`.
    async fn collect_bucket(
        &self,
        query: &DirectionQuery,
        unit: TimeUnit,
        bucket: OffsetDateTime,
        found: &mut BTreeSet<ContentKey>,
    ) -> Result<(), StorageError> {
        let prefix = format!("{}{}", channel_prefix(&query.channel_name), unit.format(bucket));
        let mut pager = KeyPager::new(
            self.store.as_ref(),
            &query.channel_name,
            prefix,
            self.settings.list_page_size,
        );
        while let Some(keys) = pager.next_page().await? {
            let mut reached_start = false;
            for key in keys {
                if key >= query.start_key {
                    reached_start = true;
                    break;
                }
                found.insert(key);
                if found.len() > query.count {
                    found.pop_first();
                }
            }
            if reached_start {
                break;
            }
        }
        Ok(())
    }
}
