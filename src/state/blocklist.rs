//! Blocklist types and address validation.
//!
//! Addresses are validated at the edit boundary: dotted-quad syntax with one to
//! three digits per group, and each group in `0..=255`. Anything else is
//! rejected as-is, never trimmed or rewritten.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::BlocklistError;

/// Separators accepted between entries of a delimited blocklist string.
const LIST_SEPARATORS: [char; 2] = [',', ';'];

/// One validated blocklist entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockedIp {
    text: String,
    addr: Ipv4Addr,
}

impl BlockedIp {
    /// Validates `text` as a dotted-quad IPv4 address.
    ///
    /// # Errors
    ///
    /// Returns [`BlocklistError::InvalidAddressFormat`] if `text` is not four
    /// groups of one to three ASCII digits separated by dots, or if any group
    /// exceeds 255.
    pub fn parse(text: &str) -> Result<Self, BlocklistError> {
        parse_dotted_quad(text)
            .map(|addr| Self {
                text: text.to_string(),
                addr,
            })
            .ok_or_else(|| BlocklistError::InvalidAddressFormat(vec![text.to_string()]))
    }

    /// The address as the user entered it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The parsed address used for matching.
    #[must_use]
    pub const fn addr(&self) -> Ipv4Addr {
        self.addr
    }
}

impl fmt::Display for BlockedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parses `\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}` with a range check on each octet.
fn parse_dotted_quad(text: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut groups = text.split('.');

    for octet in &mut octets {
        let group = groups.next()?;
        if group.is_empty() || group.len() > 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = group.parse::<u16>().ok().and_then(|v| u8::try_from(v).ok())?;
    }

    if groups.next().is_some() {
        return None;
    }

    Some(Ipv4Addr::from(octets))
}

/// Returns `true` if `text` is an acceptable blocklist entry.
#[must_use]
pub fn is_valid_address(text: &str) -> bool {
    parse_dotted_quad(text).is_some()
}

/// Ordered, duplicate-free set of blocked IPv4 addresses.
///
/// Insertion order is kept for display; lookups by address are constant time.
/// Two entries naming the same address (`10.0.0.1` and `10.0.00.1`) count as
/// the same key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockedIpSet {
    entries: Vec<BlockedIp>,
    index: HashSet<Ipv4Addr>,
}

impl BlockedIpSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from raw entries, rejecting the whole batch if any is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`BlocklistError::InvalidAddressFormat`] listing every invalid entry.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, BlocklistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        let mut invalid = Vec::new();

        for entry in entries {
            let entry = entry.as_ref();
            match BlockedIp::parse(entry) {
                Ok(ip) => {
                    set.push(ip);
                }
                Err(_) => invalid.push(entry.to_string()),
            }
        }

        if invalid.is_empty() {
            Ok(set)
        } else {
            Err(BlocklistError::InvalidAddressFormat(invalid))
        }
    }

    /// Parses a delimited list such as `"10.0.0.1, 10.0.0.2\n10.0.0.3"`.
    ///
    /// Entries may be separated by commas, semicolons or any whitespace. Empty
    /// segments between separators are ignored; every other segment must be a
    /// valid address.
    ///
    /// # Errors
    ///
    /// Returns [`BlocklistError::InvalidAddressFormat`] listing every invalid entry.
    pub fn parse_list(text: &str) -> Result<Self, BlocklistError> {
        Self::from_entries(
            text.split(|c: char| c.is_whitespace() || LIST_SEPARATORS.contains(&c))
                .filter(|segment| !segment.is_empty()),
        )
    }

    /// Adds an address. Returns `Ok(false)` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns [`BlocklistError::InvalidAddressFormat`] if `text` is not a valid address;
    /// the set is left unchanged.
    pub fn insert(&mut self, text: &str) -> Result<bool, BlocklistError> {
        let ip = BlockedIp::parse(text)?;
        Ok(self.push(ip))
    }

    /// Removes an address. Returns `Ok(false)` if it was not present.
    ///
    /// # Errors
    ///
    /// Returns [`BlocklistError::InvalidAddressFormat`] if `text` is not a valid address.
    pub fn remove(&mut self, text: &str) -> Result<bool, BlocklistError> {
        let addr = BlockedIp::parse(text)?.addr();
        if !self.index.remove(&addr) {
            return Ok(false);
        }
        self.entries.retain(|entry| entry.addr != addr);
        Ok(true)
    }

    fn push(&mut self, ip: BlockedIp) -> bool {
        if self.index.insert(ip.addr) {
            self.entries.push(ip);
            true
        } else {
            false
        }
    }

    /// Whether traffic to `addr` is blocked.
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.index.contains(&addr)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockedIp> {
        self.entries.iter()
    }

    /// Entries as entered, in insertion order.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.text.clone()).collect()
    }

    /// Comma-joined form, as the original delimited-string encoding stored it.
    #[must_use]
    pub fn to_list_string(&self) -> String {
        self.to_strings().join(",")
    }
}

impl<'a> IntoIterator for &'a BlockedIpSet {
    type Item = &'a BlockedIp;
    type IntoIter = std::slice::Iter<'a, BlockedIp>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_address() {
        let ip = BlockedIp::parse("192.168.0.102").unwrap();
        assert_eq!(ip.addr(), Ipv4Addr::new(192, 168, 0, 102));
        assert_eq!(ip.as_str(), "192.168.0.102");
    }

    #[test]
    fn test_rejects_out_of_range_octet() {
        assert!(!is_valid_address("192.168.0.1000"));
        assert!(!is_valid_address("256.1.1.1"));
        assert!(!is_valid_address("1.1.1.999"));
        assert!(is_valid_address("255.255.255.255"));
        assert!(is_valid_address("0.0.0.0"));
    }

    #[test]
    fn test_rejects_bad_syntax() {
        assert!(!is_valid_address("abc.def.1.1"));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("1.2.3"));
        assert!(!is_valid_address("1.2.3.4.5"));
        assert!(!is_valid_address("1..2.3"));
        assert!(!is_valid_address("+1.2.3.4"));
        assert!(!is_valid_address(" 1.2.3.4"));
        assert!(!is_valid_address("1.2.3.4 "));
    }

    #[test]
    fn test_leading_zeros_match_syntax() {
        let ip = BlockedIp::parse("010.000.000.001").unwrap();
        assert_eq!(ip.addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(ip.to_string(), "010.000.000.001");
    }

    #[test]
    fn test_error_names_the_entry() {
        let err = BlockedIp::parse("abc.def.1.1").unwrap_err();
        assert_eq!(
            err,
            BlocklistError::InvalidAddressFormat(vec!["abc.def.1.1".to_string()])
        );
    }

    #[test]
    fn test_insert_keeps_order_and_dedupes() {
        let mut set = BlockedIpSet::new();
        assert!(set.insert("10.0.0.2").unwrap());
        assert!(set.insert("10.0.0.1").unwrap());
        assert!(!set.insert("10.0.00.2").unwrap());
        assert_eq!(set.to_strings(), vec!["10.0.0.2", "10.0.0.1"]);
        assert!(set.contains(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn test_invalid_insert_leaves_set_unchanged() {
        let mut set = BlockedIpSet::parse_list("10.0.0.1").unwrap();
        assert!(set.insert("10.0.0.300").is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut set = BlockedIpSet::parse_list("10.0.0.1,10.0.0.2").unwrap();
        assert!(set.remove("10.0.0.1").unwrap());
        assert!(!set.remove("10.0.0.1").unwrap());
        assert!(!set.contains(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(set.to_list_string(), "10.0.0.2");
    }

    #[test]
    fn test_parse_list_mixed_separators() {
        let set = BlockedIpSet::parse_list("10.0.0.1, 10.0.0.2;10.0.0.3\n10.0.0.4,,").unwrap();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_parse_list_reports_every_invalid_entry() {
        let err = BlockedIpSet::parse_list("10.0.0.1,bad,10.0.0.256").unwrap_err();
        assert_eq!(
            err,
            BlocklistError::InvalidAddressFormat(vec!["bad".to_string(), "10.0.0.256".to_string()])
        );
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(BlockedIpSet::parse_list("").unwrap().is_empty());
        assert!(BlockedIpSet::parse_list("  \n ").unwrap().is_empty());
    }
}
