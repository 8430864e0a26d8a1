//! Route destination and prefix validation
//!
//! Destinations must be plain IPv4 or IPv6 literals. Prefix lengths are short decimal
//! strings; for IPv4 routes a dotted-quad netmask is still accepted in their place.

use crate::error::{NetError, NetResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, error, warn};

/// Largest prefix length accepted, for either address family
pub const PREFIX_LENGTH_MAX: u8 = 128;

/// Maximum number of decimal digits in a prefix length string
pub const PREFIX_LENGTH_MAX_DIGITS: usize = 3;

/// Outcome of parsing a prefix length string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixLength {
    /// No prefix given, or a prefix of 0: the route is a host route
    Empty,
    /// Prefix length in `1..=PREFIX_LENGTH_MAX`
    Length(u8),
    /// Not a decimal prefix length
    Invalid,
}

/// Check whether `input` is an IPv4 literal
pub fn parse_ipv4(input: &str) -> Option<Ipv4Addr> {
    input.parse().ok()
}

/// Check whether `input` is an IPv6 literal
pub fn parse_ipv6(input: &str) -> Option<Ipv6Addr> {
    input.parse().ok()
}

/// Parse a decimal prefix length of at most three digits.
///
/// Surrounding whitespace is ignored. An empty string and `0` both mean "no prefix".
pub fn parse_prefix_length(input: &str) -> PrefixLength {
    if input.len() > PREFIX_LENGTH_MAX_DIGITS {
        error!("Invalid prefix length {}", input.len());
        return PrefixLength::Invalid;
    }

    let digits = input.trim();
    if digits.is_empty() {
        return PrefixLength::Empty;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return PrefixLength::Invalid;
    }

    match digits.parse::<u16>() {
        Ok(0) => PrefixLength::Empty,
        Ok(n) if n <= u16::from(PREFIX_LENGTH_MAX) => PrefixLength::Length(n as u8),
        _ => PrefixLength::Invalid,
    }
}

/// Convert a dotted-quad subnet mask into a prefix length by counting its set bits
pub fn netmask_to_prefix_length(mask: &str) -> NetResult<u8> {
    let mask = parse_ipv4(mask)
        .ok_or_else(|| NetError::BadParameter(format!("Unable to parse netmask {}", mask)))?;

    let prefix = mask.to_bits().count_ones() as u8;
    debug!("Computed prefix length {} from netmask {}", prefix, mask);
    Ok(prefix)
}

/// Validated route destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTarget {
    pub destination: IpAddr,
    /// `None` for a host route
    pub prefix_length: Option<u8>,
}

/// Validate and normalize the destination and prefix of a route change.
///
/// Leading whitespace is stripped from both inputs. For IPv4 destinations a prefix
/// that is not a decimal length but is an IPv4 literal is read as a legacy netmask.
pub fn validate_route_target(destination: &str, prefix: Option<&str>) -> NetResult<RouteTarget> {
    let destination = destination.trim_start();
    let prefix = prefix.map(str::trim_start);

    if let Some(v4) = parse_ipv4(destination) {
        let prefix_length = match prefix {
            None => None,
            Some(p) => match parse_prefix_length(p) {
                PrefixLength::Empty => None,
                PrefixLength::Length(n) => Some(n),
                PrefixLength::Invalid => {
                    warn!("Input IPv4 subnet mask prefix length {} invalid", p);
                    if parse_ipv4(p).is_none() {
                        return Err(NetError::BadParameter(format!(
                            "Invalid IPv4 prefix length {}",
                            p
                        )));
                    }
                    warn!("Deprecated, a prefix length is expected and not a network mask.");
                    Some(netmask_to_prefix_length(p).map_err(|e| {
                        error!("Unable to convert mask {} to prefix length.", p);
                        e
                    })?)
                }
            },
        };
        return Ok(RouteTarget {
            destination: IpAddr::V4(v4),
            prefix_length,
        });
    }

    if let Some(v6) = parse_ipv6(destination) {
        let prefix_length = match prefix.map(parse_prefix_length) {
            None | Some(PrefixLength::Empty) => None,
            Some(PrefixLength::Length(n)) => Some(n),
            Some(PrefixLength::Invalid) => {
                let p = prefix.unwrap_or_default();
                error!("Input IPv6 subnet mask prefix length {} invalid", p);
                return Err(NetError::BadParameter(format!(
                    "Invalid IPv6 prefix length {}",
                    p
                )));
            }
        };
        return Ok(RouteTarget {
            destination: IpAddr::V6(v6),
            prefix_length,
        });
    }

    error!("Input IP address {} invalid in format", destination);
    Err(NetError::BadParameter(format!(
        "Invalid destination address {}",
        destination
    )))
}
