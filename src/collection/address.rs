use crate::error::{Error, Result};
use ethers_core::types::Address;

/// Length of a `0x`-prefixed 20-byte hex address
const ADDRESS_LEN: usize = 42;

/// Validate a contract address: trimmed, `0x` followed by exactly 40 hex
/// digits (any case). Returns the trimmed address unchanged.
pub fn validate_address(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let well_formed = trimmed.len() == ADDRESS_LEN
        && trimmed.starts_with("0x")
        && trimmed[2..].bytes().all(|b| b.is_ascii_hexdigit());

    if !well_formed {
        return Err(Error::InvalidAddress {
            address: trimmed.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Parse an already validated address into its typed form
pub fn parse_address(addr: &str) -> Result<Address> {
    validate_address(addr)?
        .parse()
        .map_err(|_| Error::InvalidAddress {
            address: addr.to_string(),
        })
}

/// Format address for logging (truncated)
pub fn format_address(addr: &str) -> String {
    if addr.len() > 12 {
        format!("{}...{}", &addr[..8], &addr[addr.len() - 4..])
    } else {
        addr.to_string()
    }
}
