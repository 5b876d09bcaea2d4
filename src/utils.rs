//! Identifier helpers

use bech32::Bech32m;
use uuid7::uuid7;

pub const CONTRACT_HRP: &str = "contract";

// construct a unique id from a uuid7 then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Fresh contract identifier, `contract1...`.
pub fn new_contract_id() -> anyhow::Result<String> {
    new_uuid_to_bech32(CONTRACT_HRP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_ids_are_unique_and_prefixed() {
        let a = new_contract_id().unwrap();
        let b = new_contract_id().unwrap();
        assert!(a.starts_with("contract1"));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_hrp_is_rejected() {
        assert!(new_uuid_to_bech32("").is_err());
    }
}
