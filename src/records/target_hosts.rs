//! Target hosts file parser.

use std::net::Ipv4Addr;

use pnet::util::MacAddr;

use super::{RecordParser, expect_fields};
use crate::network::parse_mac;

/// One poisoning target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetHostRecord {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

/// Parser for target hosts files.
///
/// # Format
///
/// ```text
/// # mac,ip
/// aa:bb:cc:dd:ee:02,10.0.0.50
/// AA-BB-CC-DD-EE-03,10.0.0.51
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetHostsParser;

impl RecordParser for TargetHostsParser {
    type Record = TargetHostRecord;

    fn parse_fields(&self, fields: &[&str]) -> Result<TargetHostRecord, String> {
        expect_fields(fields, &[2])?;

        let mac = parse_mac(fields[0]).map_err(|err| err.to_string())?;
        let ip = fields[1]
            .parse()
            .map_err(|_| format!("invalid IP address {:?}", fields[1]))?;

        Ok(TargetHostRecord { mac, ip })
    }
}
