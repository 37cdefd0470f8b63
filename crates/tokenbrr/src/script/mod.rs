//! Script pipeline: a [`ScriptSource`] followed by an ordered list of
//! [`Transform`]s.

use std::sync::Arc;

use bytes::Bytes;

use crate::{error::LoadError, ledger::AccountKey};

mod cache;
mod source;
mod template;
mod transform;

pub use cache::ScriptCache;
pub use source::{HttpFetcher, ScriptFetcher, ScriptSource};
pub use transform::Transform;

/// Produces a script by loading its source and applying transforms strictly
/// left to right.
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    source: ScriptSource,
    transforms: Vec<Transform>,
}

impl ScriptLoader {
    pub const fn new(source: ScriptSource) -> Self {
        Self {
            source,
            transforms: Vec::new(),
        }
    }

    pub fn bytes(script: impl Into<Bytes>) -> Self {
        Self::new(ScriptSource::Bytes(script.into()))
    }

    pub fn remote(url: impl Into<String>, cache: Arc<ScriptCache>) -> Self {
        Self::new(ScriptSource::Remote {
            url: url.into(),
            cache,
        })
    }

    pub fn account_creation(keys: Vec<AccountKey>) -> Self {
        Self::new(ScriptSource::AccountCreation { keys })
    }

    pub fn compose(source: ScriptSource, transforms: impl IntoIterator<Item = Transform>) -> Self {
        Self::new(source).then(transforms)
    }

    /// Appends transforms after the ones already present.
    #[must_use]
    pub fn then(mut self, transforms: impl IntoIterator<Item = Transform>) -> Self {
        self.transforms.extend(transforms);
        self
    }

    #[must_use]
    pub fn with(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub async fn load(&self) -> Result<Bytes, LoadError> {
        let mut script = self.source.load().await?;
        for transform in &self.transforms {
            script = transform.apply(script);
        }
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger::Address, testing::StaticFetcher};

    const TRANSFER: &str = "import FungibleToken from 0x02\n\
        transaction { execute { getAccount(0x04).deposit(10.0) } }";

    fn address(hex: &str) -> Address {
        Address::from_hex(hex).unwrap()
    }

    #[tokio::test]
    async fn applies_transforms_left_to_right() {
        // The second transform only matches text produced by the first.
        let import = Transform::replace_import("0x02", address("01ab"));

        let import_first = ScriptLoader::bytes(TRANSFER)
            .with(import.clone())
            .with(Transform::replace_amount("0x00000000000001ab", 7))
            .load()
            .await
            .unwrap();
        let amount_first = ScriptLoader::bytes(TRANSFER)
            .with(Transform::replace_amount("0x00000000000001ab", 7))
            .with(import)
            .load()
            .await
            .unwrap();

        assert!(std::str::from_utf8(&import_first).unwrap().contains("from 7.0"));
        assert!(std::str::from_utf8(&amount_first).unwrap().contains("from 0x00000000000001ab"));
        assert_ne!(import_first, amount_first);
    }

    #[tokio::test]
    async fn composition_is_associative() {
        let t1 = Transform::replace_import("0x02", address("01"));
        let t2 = Transform::replace_recipient("0x04", address("05"));
        let t3 = Transform::replace_amount("10.0", 3);
        let source = ScriptSource::Bytes(Bytes::from_static(TRANSFER.as_bytes()));

        let flat = ScriptLoader::compose(source.clone(), [t1.clone(), t2.clone(), t3.clone()]);
        let nested = ScriptLoader::compose(source, [t1]).then([t2]).then([t3]);

        assert_eq!(flat.load().await.unwrap(), nested.load().await.unwrap());
    }

    #[tokio::test]
    async fn remote_load_failure_skips_transforms() {
        let cache = Arc::new(ScriptCache::new(Arc::new(StaticFetcher::new())));
        let loader = ScriptLoader::remote("https://scripts.test/missing.cdc", cache)
            .with(Transform::replace_amount("10.0", 1));
        assert!(matches!(loader.load().await, Err(LoadError::Status { .. })));
    }

    #[tokio::test]
    async fn account_creation_source_yields_template() {
        let script = ScriptLoader::account_creation(vec![]).load().await.unwrap();
        assert!(std::str::from_utf8(&script).unwrap().contains("AuthAccount(payer: signer)"));
    }
}
