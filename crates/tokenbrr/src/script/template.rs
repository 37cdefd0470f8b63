use alloy_primitives::hex;
use alloy_rlp::Encodable;
use bytes::Bytes;

use crate::ledger::{
    transaction::{rlp_list, Field},
    AccountKey,
};

/// Builds a script that creates an account paid for by its single authorizer,
/// registers `keys` on it and, when `code` is non-empty, deploys `code` as the
/// account's contract.
pub(crate) fn create_account(keys: &[AccountKey], code: &[u8]) -> Bytes {
    let mut script = String::from(
        "transaction {\n  prepare(signer: AuthAccount) {\n    \
         let account = AuthAccount(payer: signer)\n",
    );
    for key in keys {
        script.push_str(&format!(
            "    account.addPublicKey(\"{}\".decodeHex())\n",
            hex::encode(encode_account_key(key))
        ));
    }
    if !code.is_empty() {
        script.push_str(&format!(
            "    account.setCode(\"{}\".decodeHex())\n",
            hex::encode(code)
        ));
    }
    script.push_str("  }\n}\n");
    Bytes::from(script)
}

/// `[public_key, sign_algo, hash_algo, weight]`
fn encode_account_key(key: &AccountKey) -> Vec<u8> {
    let sign_algo = key.sign_algo.code();
    let hash_algo = key.hash_algo.code();
    let weight = u64::from(key.weight);
    let fields: [&dyn Encodable; 4] = [
        &Field(&key.public_key[..]),
        &sign_algo,
        &hash_algo,
        &weight,
    ];
    rlp_list(&fields)
}
