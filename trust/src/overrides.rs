use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::rc::Rc;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::clock::{unix_day, Clock, SystemClock};
use crate::fingerprint::Fingerprint;

pub const DEFAULT_PORT: i32 = 443;
pub const UNSPECIFIED_PORT: i32 = -1;

/// Port `-1` means "the default https port"; both spellings key the same entry.
pub fn canonical_port(port: i32) -> i32 {
    if port == UNSPECIFIED_PORT {
        DEFAULT_PORT
    } else {
        port
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Unknown override reason {0:?}")]
pub struct UnknownReason(pub String);

/// Reasons a certificate failed validation that an operator chose to accept.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OverrideBits(u32);

impl OverrideBits {
    pub const NONE: Self = Self(0);
    pub const UNTRUSTED: Self = Self(1);
    pub const MISMATCH: Self = Self(2);
    pub const TIME: Self = Self(4);

    const NAMED: [(Self, &'static str, char); 3] = [
        (Self::MISMATCH, "mismatch", 'M'),
        (Self::UNTRUSTED, "untrusted", 'U'),
        (Self::TIME, "time", 'T'),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }
    /// Returns `None` if `bits` carries a flag this crate doesn't know.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let all = Self::UNTRUSTED.0 | Self::MISMATCH.0 | Self::TIME.0;
        if bits & !all == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Compact storage form, e.g. `MU` for mismatch + untrusted.
    pub fn to_letters(self) -> String {
        Self::NAMED
            .iter()
            .filter(|(flag, _, _)| self.contains(*flag))
            .map(|(_, _, letter)| *letter)
            .collect()
    }
    pub fn from_letters(s: &str) -> Result<Self, UnknownReason> {
        s.chars().try_fold(Self::NONE, |acc, c| {
            Self::NAMED
                .iter()
                .find(|(_, _, letter)| *letter == c)
                .map(|(flag, _, _)| acc | *flag)
                .ok_or_else(|| UnknownReason(c.to_string()))
        })
    }
}

impl BitOr for OverrideBits {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OverrideBits {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for OverrideBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _, _)| self.contains(*flag))
            .map(|(_, name, _)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

impl fmt::Debug for OverrideBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OverrideBits({})", self)
    }
}

// Accepts "untrusted,time" or "untrusted|time"
impl FromStr for OverrideBits {
    type Err = UnknownReason;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(|c| c == ',' || c == '|')
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != "none")
            .try_fold(Self::NONE, |acc, name| {
                Self::NAMED
                    .iter()
                    .find(|(_, known, _)| known.eq_ignore_ascii_case(name))
                    .map(|(flag, _, _)| acc | *flag)
                    .ok_or_else(|| UnknownReason(name.to_string()))
            })
    }
}

/// Whether a stored override still applies when the presented certificate
/// differs from the one the operator accepted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintPolicy {
    /// Return the entry and let the caller compare fingerprints.
    #[default]
    Advisory,
    /// Treat a fingerprint mismatch as no override at all.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverrideKey {
    pub host: String,
    pub port: i32,
}

impl OverrideKey {
    pub fn new(host: &str, port: i32) -> Self {
        Self {
            host: host.to_string(),
            port: canonical_port(port),
        }
    }
}

impl fmt::Display for OverrideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for OverrideKey {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').unwrap_or((s, ""));
        Ok(Self::new(host, port.parse()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideEntry {
    pub key: OverrideKey,
    pub fingerprint: Fingerprint,
    pub bits: OverrideBits,
    pub temporary: bool,
    /// Number of distinct days this entry was used.
    pub score: u32,
    /// Day index (since the Unix epoch) of the last use.
    pub last_accessed: u64,
}

impl OverrideEntry {
    fn touch(&mut self, today: u64) {
        if today > self.last_accessed {
            self.score = self.score.saturating_add(1);
            self.last_accessed = today;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedOverride {
    pub bits: OverrideBits,
    pub temporary: bool,
    pub fingerprint_matches: bool,
}

/// Operator decisions of the form "accept this certificate on this host and
/// port despite these validation errors".
///
/// Entries are keyed by host and canonical port only. The fingerprint is
/// payload: a later [`remember`](Self::remember) for the same host and port
/// replaces the earlier entry whatever certificate it named.
#[derive(Debug, Clone)]
pub struct OverrideStore {
    entries: HashMap<OverrideKey, OverrideEntry>,
    policy: FingerprintPolicy,
    clock: Rc<dyn Clock>,
}

impl Default for OverrideStore {
    fn default() -> Self {
        Self::new(FingerprintPolicy::default(), Rc::new(SystemClock))
    }
}

impl OverrideStore {
    pub fn new(policy: FingerprintPolicy, clock: Rc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> FingerprintPolicy {
        self.policy
    }

    /// Returns true if no entry existed for this host and port.
    pub fn remember(
        &mut self,
        host: &str,
        port: i32,
        fingerprint: &Fingerprint,
        bits: OverrideBits,
        temporary: bool,
    ) -> bool {
        let key = OverrideKey::new(host, port);
        info!("Remembering override for {} ({}, temporary: {})", key, bits, temporary);
        let entry = OverrideEntry {
            key: key.clone(),
            fingerprint: *fingerprint,
            bits,
            temporary,
            score: 1,
            last_accessed: unix_day(self.clock.now()),
        };
        self.entries.insert(key, entry).is_none()
    }

    /// Looks up the override for `host` and `port`, recording the access.
    pub fn matching_override(
        &mut self,
        host: &str,
        port: i32,
        fingerprint: &Fingerprint,
    ) -> Option<MatchedOverride> {
        let today = unix_day(self.clock.now());
        let policy = self.policy;
        let entry = self.entries.get_mut(&OverrideKey::new(host, port))?;
        let fingerprint_matches = entry.fingerprint == *fingerprint;
        if !fingerprint_matches && policy == FingerprintPolicy::Strict {
            debug!("Override for {} names a different certificate", entry.key);
            return None;
        }
        entry.touch(today);
        Some(MatchedOverride {
            bits: entry.bits,
            temporary: entry.temporary,
            fingerprint_matches,
        })
    }

    pub fn get(&self, host: &str, port: i32) -> Option<&OverrideEntry> {
        self.entries.get(&OverrideKey::new(host, port))
    }

    /// Returns the removed entry, if there was one.
    pub fn clear(&mut self, host: &str, port: i32) -> Option<OverrideEntry> {
        let removed = self.entries.remove(&OverrideKey::new(host, port));
        if let Some(entry) = &removed {
            info!("Cleared override for {}", entry.key);
        }
        removed
    }

    /// Drops every temporary entry. Returns how many were dropped.
    pub fn end_session(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.temporary);
        let dropped = before - self.entries.len();
        debug!("Session ended, dropped {} temporary overrides", dropped);
        dropped
    }

    pub fn entries(&self) -> impl Iterator<Item = &OverrideEntry> {
        self.entries.values()
    }

    pub fn permanent_entries(&self) -> impl Iterator<Item = &OverrideEntry> {
        self.entries.values().filter(|entry| !entry.temporary)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert_entry(&mut self, entry: OverrideEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }
}
