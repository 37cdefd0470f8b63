use bytes::Bytes;

use super::template;
use crate::ledger::{AccountKey, Address};

/// Deterministic rewrite of a script buffer. Unmatched patterns leave the
/// script untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// Replaces ` {placeholder}` with ` 0x{address}` (import position).
    ReplaceImport {
        placeholder: String,
        address: Address,
    },
    /// Replaces `getAccount({placeholder})` with `getAccount(0x{address})`.
    ReplaceRecipient {
        placeholder: String,
        address: Address,
    },
    /// Replaces every `placeholder` with the amount rendered as `{amount}.0`.
    ReplaceAmount { placeholder: String, amount: u64 },
    /// Turns the script into an account creation script that deploys it as
    /// contract code and registers `keys` on the new account.
    DeployContract { keys: Vec<AccountKey> },
}

impl Transform {
    pub fn replace_import(placeholder: impl Into<String>, address: Address) -> Self {
        Self::ReplaceImport {
            placeholder: placeholder.into(),
            address,
        }
    }

    pub fn replace_recipient(placeholder: impl Into<String>, address: Address) -> Self {
        Self::ReplaceRecipient {
            placeholder: placeholder.into(),
            address,
        }
    }

    pub fn replace_amount(placeholder: impl Into<String>, amount: u64) -> Self {
        Self::ReplaceAmount {
            placeholder: placeholder.into(),
            amount,
        }
    }

    pub fn apply(&self, script: Bytes) -> Bytes {
        match self {
            Self::ReplaceImport {
                placeholder,
                address,
            } => replace_all(
                script,
                format!(" {placeholder}").as_bytes(),
                format!(" 0x{}", address.hex()).as_bytes(),
            ),
            Self::ReplaceRecipient {
                placeholder,
                address,
            } => replace_all(
                script,
                format!("getAccount({placeholder})").as_bytes(),
                format!("getAccount(0x{})", address.hex()).as_bytes(),
            ),
            Self::ReplaceAmount {
                placeholder,
                amount,
            } => replace_all(
                script,
                placeholder.as_bytes(),
                format!("{amount}.0").as_bytes(),
            ),
            Self::DeployContract { keys } => template::create_account(keys, &script),
        }
    }
}

fn replace_all(script: Bytes, pattern: &[u8], replacement: &[u8]) -> Bytes {
    if pattern.is_empty() || find(&script, pattern).is_none() {
        return script;
    }
    let mut out = Vec::with_capacity(script.len());
    let mut rest = &script[..];
    while let Some(pos) = find(rest, pattern) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(replacement);
        rest = &rest[pos + pattern.len()..];
    }
    out.extend_from_slice(rest);
    Bytes::from(out)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
