//! DNS spoofing rules.
//!
//! Rules are matched in insertion order: first every enabled rule whose
//! hostname equals the query exactly, then every enabled wildcard rule whose
//! pattern glob-matches it. Comparison is case-sensitive as stored.

use std::fmt;
use std::net::Ipv4Addr;

/// Wildcard marker at the start of a hostname pattern.
const WILDCARD: char = '*';

/// Record type of the spoofed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsRecordType {
    A,
    Cname,
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.pad("A"),
            Self::Cname => f.pad("CNAME"),
        }
    }
}

/// One spoofing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSpoofRule {
    /// Hostname or pattern as configured, e.g. `*.example.com`.
    pub hostname: String,
    /// For wildcard rules, the part after the leading `*`.
    pub wildcard_suffix: Option<String>,
    pub spoofed_ip: Ipv4Addr,
    pub cname_target: Option<String>,
    pub ttl: u32,
    pub record_type: DnsRecordType,
    /// Disabled rules are listed but never match.
    pub enabled: bool,
}

impl DnsSpoofRule {
    pub const fn is_wildcard(&self) -> bool {
        self.wildcard_suffix.is_some()
    }

    fn new(
        hostname: String,
        ttl: u32,
        record_type: DnsRecordType,
        cname_target: Option<String>,
        spoofed_ip: Ipv4Addr,
        enabled: bool,
    ) -> Self {
        let wildcard_suffix = hostname.strip_prefix(WILDCARD).map(str::to_string);
        Self {
            hostname,
            wildcard_suffix,
            spoofed_ip,
            cname_target,
            ttl,
            record_type,
            enabled,
        }
    }
}

/// Ordered collection of spoofing rules.
///
/// Populated once at startup and read-only afterwards, so lookups take
/// `&self` and need no lock.
#[derive(Debug, Clone, Default)]
pub struct DnsSpoofRegistry {
    rules: Vec<DnsSpoofRule>,
}

impl DnsSpoofRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an A record rule.
    pub fn insert_a_record(
        &mut self,
        hostname: impl Into<String>,
        ttl: u32,
        spoofed_ip: Ipv4Addr,
        enabled: bool,
    ) {
        self.upsert(DnsSpoofRule::new(
            hostname.into(),
            ttl,
            DnsRecordType::A,
            None,
            spoofed_ip,
            enabled,
        ));
    }

    /// Add a CNAME record rule; `spoofed_ip` answers the CNAME target.
    pub fn insert_cname_record(
        &mut self,
        hostname: impl Into<String>,
        ttl: u32,
        cname_target: impl Into<String>,
        spoofed_ip: Ipv4Addr,
        enabled: bool,
    ) {
        self.upsert(DnsSpoofRule::new(
            hostname.into(),
            ttl,
            DnsRecordType::Cname,
            Some(cname_target.into()),
            spoofed_ip,
            enabled,
        ));
    }

    // Same hostname and type: last write wins, keeping the original position.
    fn upsert(&mut self, rule: DnsSpoofRule) {
        if let Some(existing) = self
            .rules
            .iter_mut()
            .find(|r| r.hostname == rule.hostname && r.record_type == rule.record_type)
        {
            *existing = rule;
        } else {
            self.rules.push(rule);
        }
    }

    /// First rule matching `query`, exact matches before wildcards.
    pub fn find_by_hostname(&self, query: &str) -> Option<&DnsSpoofRule> {
        let enabled = || self.rules.iter().filter(|rule| rule.enabled);

        enabled()
            .find(|rule| !rule.is_wildcard() && rule.hostname == query)
            .or_else(|| {
                enabled().find(|rule| rule.is_wildcard() && wildcard_compare(&rule.hostname, query))
            })
    }

    /// Visit every rule in insertion order.
    pub fn for_each(&self, visitor: impl FnMut(&DnsSpoofRule)) {
        self.rules.iter().for_each(visitor);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Glob match where `*` stands for any run of characters, including none.
///
/// Every other character, `?` included, matches only itself. The whole of
/// `text` must be consumed.
pub fn wildcard_compare(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == WILDCARD {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, absorbed)) = backtrack {
            p = star + 1;
            t = absorbed + 1;
            backtrack = Some((star, t));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == WILDCARD)
}
