//! Wallet entries as stored in wallets.json

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A locally held key-pair with its proxy assignment
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Positive, unique; drives the default proxy index
    pub id: u32,

    /// Checksummed EVM address
    pub address: String,

    /// Hex secret key, with or without 0x prefix
    pub private_key: String,

    /// Explicit proxy assignment. An empty string in the file means none.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub proxy: Option<String>,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("private_key", &"***")
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl Wallet {
    /// Short form for log lines: 0x1234…abcd
    pub fn short_address(&self) -> String {
        let chars: Vec<char> = self.address.chars().collect();
        if chars.len() <= 12 {
            return self.address.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_address_multibyte() {
        let mut wallet = Wallet {
            id: 1,
            address: "0xéééééééééééééééé€€€€".into(),
            private_key: String::new(),
            proxy: None,
        };
        assert_eq!(wallet.short_address(), "0xéééé…€€€€");

        wallet.address = "0xéé".into();
        assert_eq!(wallet.short_address(), "0xéé");
    }

    #[test]
    fn test_parse_wallet_file_entry() {
        let json = r#"[
            {"id": 1, "address": "0xabc", "privateKey": "0x01", "proxy": ""},
            {"id": 2, "address": "0xdef", "privateKey": "0x02", "proxy": "socks5://h:1"},
            {"id": 3, "address": "0x123", "privateKey": "0x03"}
        ]"#;
        let wallets: Vec<Wallet> = serde_json::from_str(json).unwrap();
        assert_eq!(wallets[0].proxy, None);
        assert_eq!(wallets[1].proxy.as_deref(), Some("socks5://h:1"));
        assert_eq!(wallets[2].proxy, None);
    }

    #[test]
    fn test_debug_masks_key() {
        let wallet = Wallet {
            id: 1,
            address: "0xabc".into(),
            private_key: "0xdeadbeef".into(),
            proxy: None,
        };
        let printed = format!("{:?}", wallet);
        assert!(!printed.contains("deadbeef"));
    }

    #[test]
    fn test_short_address() {
        let wallet = Wallet {
            id: 1,
            address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into(),
            private_key: String::new(),
            proxy: None,
        };
        assert_eq!(wallet.short_address(), "0xf39F…2266");
    }
}
