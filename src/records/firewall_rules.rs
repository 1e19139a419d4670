//! Firewall rules file parser.

use super::{RecordParser, expect_fields, wildcard_field};
use crate::network::Protocol;
use crate::registry::FirewallRule;

/// Parser for firewall rule files.
///
/// # Format
///
/// ```text
/// # protocol,src_ip,dst_ip,src_port,dst_port
/// UDP,*,*,*,53
/// *,10.0.0.50,*,*,*
/// ```
///
/// Protocol is `TCP`, `UDP`, `ICMP` or `*`; `*` in any field matches anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirewallRulesParser;

impl RecordParser for FirewallRulesParser {
    type Record = FirewallRule;

    fn parse_fields(&self, fields: &[&str]) -> Result<FirewallRule, String> {
        expect_fields(fields, &[5])?;

        let protocol = match fields[0].to_ascii_uppercase().as_str() {
            "*" => None,
            "TCP" => Some(Protocol::Tcp),
            "UDP" => Some(Protocol::Udp),
            "ICMP" => Some(Protocol::Icmp),
            _ => return Err(format!("unsupported protocol {:?}", fields[0])),
        };

        Ok(FirewallRule {
            protocol,
            src_ip: wildcard_field(fields[1], "source IP")?,
            dst_ip: wildcard_field(fields[2], "destination IP")?,
            src_port: wildcard_field(fields[3], "source port")?,
            dst_port: wildcard_field(fields[4], "destination port")?,
        })
    }
}
