//! Cache key layout.
//!
//! Every cached copy of a record lives under
//! `{prefix}:hash:{fingerprint}:serverId:{id}`, so one glob selects a whole
//! partition (`{prefix}:hash:{fp}:serverId:*`) and another selects every copy
//! of a record across partitions (`{prefix}:hash:*:serverId:{id}`).

use fleet_core::{QueryFingerprint, ServerId};

const HASH_SEGMENT: &str = "hash";
const ID_SEGMENT: &str = "serverId";

/// Builds and parses keys under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyspace {
    prefix: String,
}

impl CacheKeyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of one record inside one partition.
    pub fn entry(&self, fp: &QueryFingerprint, id: ServerId) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.prefix, HASH_SEGMENT, fp, ID_SEGMENT, id
        )
    }

    /// Glob over every key of one partition.
    pub fn partition_pattern(&self, fp: &QueryFingerprint) -> String {
        format!("{}:{}:{}:{}:*", self.prefix, HASH_SEGMENT, fp, ID_SEGMENT)
    }

    /// Glob over every cached copy of one record.
    pub fn occurrences_pattern(&self, id: ServerId) -> String {
        format!("{}:{}:*:{}:{}", self.prefix, HASH_SEGMENT, ID_SEGMENT, id)
    }

    /// Glob over everything this keyspace owns.
    pub fn all_pattern(&self) -> String {
        format!("{}:{}:*", self.prefix, HASH_SEGMENT)
    }

    /// Split a key back into its fingerprint and record id.
    pub fn parse(&self, key: &str) -> Option<(QueryFingerprint, ServerId)> {
        let rest = key
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix(':')?
            .strip_prefix(HASH_SEGMENT)?
            .strip_prefix(':')?;
        let marker = format!(":{}:", ID_SEGMENT);
        let (fp, id) = rest.rsplit_once(marker.as_str())?;
        if fp.is_empty() {
            return None;
        }
        let id = id.parse::<ServerId>().ok()?;
        Some((QueryFingerprint::from_hex(fp), id))
    }
}

/// Redis-style glob match supporting `*` only, which is all the key layout
/// ever emits.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
