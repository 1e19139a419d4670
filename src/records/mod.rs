//! Record file parsers.
//!
//! Every record file shares one layout: one record per line, fields separated
//! by commas, blank lines and lines starting with `#` ignored. Surrounding
//! whitespace and one trailing comma are tolerated.
//!
//! # Example
//!
//! ```
//! use redwire::records::{RecordParser, TargetHostsParser};
//! use std::io::BufReader;
//!
//! let content = "# victims\naa:bb:cc:dd:ee:02,10.0.0.50\n";
//! let records = TargetHostsParser
//!     .parse(&mut BufReader::new(content.as_bytes()))
//!     .unwrap();
//! assert_eq!(records.len(), 1);
//! ```

mod dns_hosts;
mod firewall_rules;
pub mod loader;
mod target_hosts;

use std::io::BufRead;

pub use dns_hosts::{DnsHostRecord, DnsHostsParser};
pub use firewall_rules::FirewallRulesParser;
pub use loader::{LoadError, load_dns_hosts, load_firewall_rules, load_target_hosts};
pub use target_hosts::{TargetHostRecord, TargetHostsParser};

/// Error type for record parsing operations.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// I/O error during reading.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Invalid line encountered during parsing.
    #[error("invalid line {line}: {reason}")]
    InvalidLine {
        /// Line number (1-indexed).
        line: usize,
        /// Reason for the error.
        reason: String,
    },
}

/// Parser for one record file format.
pub trait RecordParser: Send + Sync {
    type Record;

    /// Build one record from the comma separated fields of a line.
    fn parse_fields(&self, fields: &[&str]) -> Result<Self::Record, String>;

    /// Parse every record in `reader`.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if reading fails or a line is malformed.
    fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<Self::Record>, ParseError> {
        let mut records = Vec::new();
        let mut line = String::new();
        let mut number = 0;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields = split_fields(trimmed);
            let record = self
                .parse_fields(&fields)
                .map_err(|reason| ParseError::InvalidLine {
                    line: number,
                    reason,
                })?;
            records.push(record);
        }

        Ok(records)
    }
}

fn split_fields(line: &str) -> Vec<&str> {
    let line = line.strip_suffix(',').unwrap_or(line);
    line.split(',').map(str::trim).collect()
}

/// `None` for `*`, otherwise the parsed value.
fn wildcard_field<T: std::str::FromStr>(field: &str, name: &str) -> Result<Option<T>, String> {
    if field == "*" {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| format!("invalid {name} {field:?}"))
}

fn expect_fields(fields: &[&str], expected: &[usize]) -> Result<(), String> {
    if expected.contains(&fields.len()) {
        Ok(())
    } else {
        Err(format!(
            "expected {} fields, found {}",
            expected
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
            fields.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_split_and_trim_fields_with_trailing_comma() {
        assert_eq!(
            split_fields("y, a.com ,A,60,1.2.3.4,"),
            vec!["y", "a.com", "A", "60", "1.2.3.4"]
        );
        assert_eq!(split_fields("a,b"), vec!["a", "b"]);
    }

    #[test]
    fn should_treat_star_as_wildcard_field() {
        assert_eq!(wildcard_field::<u16>("*", "port"), Ok(None));
        assert_eq!(wildcard_field::<u16>("53", "port"), Ok(Some(53)));
        assert!(wildcard_field::<u16>("99999", "port").is_err());
    }

    #[test]
    fn should_describe_field_count_mismatch() {
        assert_eq!(
            expect_fields(&["a"], &[5, 6]),
            Err("expected 5 or 6 fields, found 1".to_string())
        );
        assert!(expect_fields(&["a", "b"], &[2]).is_ok());
    }
}
