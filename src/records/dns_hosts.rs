//! DNS hosts file parser.

use std::net::Ipv4Addr;

use super::{RecordParser, expect_fields};
use crate::registry::{DnsRecordType, DnsSpoofRegistry};

/// One DNS spoofing entry as written in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsHostRecord {
    pub enabled: bool,
    pub hostname: String,
    pub record_type: DnsRecordType,
    pub ttl: u32,
    pub cname_target: Option<String>,
    pub spoofed_ip: Ipv4Addr,
}

impl DnsHostRecord {
    /// Add this entry to `registry`.
    pub fn insert_into(self, registry: &mut DnsSpoofRegistry) {
        match self.cname_target {
            Some(target) => {
                registry.insert_cname_record(
                    self.hostname,
                    self.ttl,
                    target,
                    self.spoofed_ip,
                    self.enabled,
                );
            }
            None => {
                registry.insert_a_record(self.hostname, self.ttl, self.spoofed_ip, self.enabled);
            }
        }
    }
}

/// Parser for DNS hosts files.
///
/// # Format
///
/// ```text
/// # enabled,hostname,A,ttl,ip
/// y,www.example.com,A,120,192.168.0.58
/// # enabled,hostname,CNAME,ttl,cname,ip
/// y,*google.com,CNAME,20,google.example.io,192.168.0.58
/// ```
///
/// The enabled flag is `y` or `n`; a disabled entry is kept but never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsHostsParser;

impl RecordParser for DnsHostsParser {
    type Record = DnsHostRecord;

    fn parse_fields(&self, fields: &[&str]) -> Result<DnsHostRecord, String> {
        expect_fields(fields, &[5, 6])?;

        let enabled = match fields[0] {
            "y" | "Y" => true,
            "n" | "N" => false,
            other => return Err(format!("enabled flag must be y or n, found {other:?}")),
        };

        let hostname = fields[1];
        if hostname.is_empty() {
            return Err("empty hostname".into());
        }

        let ttl = fields[3]
            .parse()
            .map_err(|_| format!("invalid TTL {:?}", fields[3]))?;

        let kind = fields[2].to_ascii_uppercase();
        let (record_type, cname_target, ip) = match (kind.as_str(), fields.len()) {
            ("A", 5) => (DnsRecordType::A, None, fields[4]),
            ("CNAME", 6) if !fields[4].is_empty() => {
                (DnsRecordType::Cname, Some(fields[4].to_string()), fields[5])
            }
            ("A" | "CNAME", _) => {
                return Err(format!("wrong field count for {} record", fields[2]));
            }
            (other, _) => return Err(format!("unsupported record type {other:?}")),
        };

        let spoofed_ip = ip
            .parse()
            .map_err(|_| format!("invalid IP address {ip:?}"))?;

        Ok(DnsHostRecord {
            enabled,
            hostname: hostname.to_string(),
            record_type,
            ttl,
            cname_target,
            spoofed_ip,
        })
    }
}
