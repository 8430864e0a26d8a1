//! DHCP lease file parsing
//!
//! Lease files use the dhclient/dhcpcd `keyword value1 value2 ...;` layout. The parser
//! takes the first line containing the option keyword and returns the text one byte
//! past the keyword up to the first `;`. No quoting or escapes are handled.

use crate::error::{NetError, NetResult};
use crate::platform::PlatformAdapter;
use crate::types::{AddressKind, AddressSet, InterfaceName};
use nix::fcntl::{flock, FlockArg};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::fd::AsRawFd;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, warn};

/// Longest textual IPv4 address, including terminator
pub const IPV4_ADDR_MAX_BYTES: usize = 16;

/// Longest textual IPv6 address, including terminator
pub const IPV6_ADDR_MAX_BYTES: usize = 46;

/// Capacity for an option value holding two addresses of each family
pub const LEASE_VALUE_MAX_BYTES: usize = 2 * (IPV4_ADDR_MAX_BYTES + IPV6_ADDR_MAX_BYTES + 1);

/// Read the value of the `kind` option from the lease file of `interface`.
///
/// Errors:
/// - `NotFound` if the lease file does not exist or lacks the option
/// - `Overflow` if the value is longer than `capacity` bytes
/// - `Fault` if the lease file path cannot be resolved or the file cannot be read
pub async fn read_lease_option(
    platform: &dyn PlatformAdapter,
    interface: &InterfaceName,
    kind: AddressKind,
    capacity: usize,
) -> NetResult<String> {
    let path = platform
        .dhcp_lease_file_path(interface)
        .await
        .map_err(|e| {
            error!("Unable to get {} DHCP lease file path: {}", interface, e);
            NetError::Fault(format!("No DHCP lease file path for {}", interface))
        })?;

    debug!("Attempting to read in {} DHCP lease file", interface);
    find_option_in_file(&path, kind.lease_option(), capacity).await
}

/// Scan `path` for the first line containing `option` and extract its value.
///
/// Lines are matched as raw bytes; only the extracted value is decoded.
pub async fn find_option_in_file(
    path: &Path,
    option: &str,
    capacity: usize,
) -> NetResult<String> {
    let file = open_shared(path).await?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await.map_err(|e| {
            error!("Failed to read DHCP lease file {}: {}", path.display(), e);
            NetError::Fault(format!("Failed to read {}: {}", path.display(), e))
        })?;
        if read == 0 {
            break;
        }

        if let Some(value) = extract_option_value(&line, option) {
            if value.len() > capacity {
                return Err(NetError::Overflow(format!(
                    "Value of {} in {} exceeds {} bytes",
                    option,
                    path.display(),
                    capacity
                )));
            }
            return Ok(String::from_utf8_lossy(value).into_owned());
        }
    }

    Err(NetError::NotFound(format!(
        "Option {} not found in {}",
        option,
        path.display()
    )))
}

/// Extract the value following `option` on `line`, if the line contains it
pub fn extract_option_value<'a>(line: &'a [u8], option: &str) -> Option<&'a [u8]> {
    let option = option.as_bytes();
    if option.is_empty() {
        return None;
    }
    let found = line.windows(option.len()).position(|w| w == option)?;
    let start = found + option.len() + 1;

    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    let rest = line.get(start..end).unwrap_or(&[]);
    Some(match rest.iter().position(|&b| b == b';') {
        Some(semi) => &rest[..semi],
        None => rest,
    })
}

/// Split an option value into at most `max_per_family` addresses of each family.
///
/// Tokens containing `:` are IPv6, everything else IPv4. Tokens that do not parse are
/// skipped; excess addresses are ignored.
pub fn split_addresses(value: &str, max_per_family: usize) -> AddressSet {
    let mut addrs = AddressSet::default();

    for token in value.split_ascii_whitespace() {
        if token.contains(':') {
            if addrs.ipv6.len() >= max_per_family {
                continue;
            }
            match token.parse::<Ipv6Addr>() {
                Ok(a) => addrs.ipv6.push(a),
                Err(_) => warn!("Skipping malformed IPv6 address {} in lease", token),
            }
        } else {
            if addrs.ipv4.len() >= max_per_family {
                continue;
            }
            match token.parse::<Ipv4Addr>() {
                Ok(a) => addrs.ipv4.push(a),
                Err(_) => warn!("Skipping malformed IPv4 address {} in lease", token),
            }
        }
    }

    addrs
}

/// Read and split the `kind` addresses from the lease file of `interface`
pub async fn lease_addresses(
    platform: &dyn PlatformAdapter,
    interface: &InterfaceName,
    kind: AddressKind,
) -> NetResult<AddressSet> {
    let value = read_lease_option(platform, interface, kind, LEASE_VALUE_MAX_BYTES).await?;
    debug!("Trying to parse: {}", value);
    Ok(split_addresses(&value, kind.max_per_family()))
}

/// Open a lease file for reading under a shared advisory lock.
///
/// The lock is released when the returned file is dropped.
async fn open_shared(path: &Path) -> NetResult<File> {
    let file = File::open(path).await.map_err(|e| {
        error!("Could not open {} DHCP lease file. Error: {}", path.display(), e);
        if e.kind() == std::io::ErrorKind::NotFound {
            NetError::NotFound(format!("No lease file {}", path.display()))
        } else {
            NetError::Fault(format!("Cannot open {}: {}", path.display(), e))
        }
    })?;

    flock(file.as_raw_fd(), FlockArg::LockSharedNonblock).map_err(|e| {
        error!("Could not lock {} DHCP lease file. Error: {}", path.display(), e);
        NetError::Fault(format!("Cannot lock {}: {}", path.display(), e))
    })?;

    debug!("Lease file successfully opened");
    Ok(file)
}
