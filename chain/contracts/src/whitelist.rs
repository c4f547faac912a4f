//! Asset whitelist: the set of fungible assets eligible for custody
//!
//! - Owner-gated add/remove with contract-code validation
//! - Partial-success batch add
//! - Insertion-ordered pagination with a capped page size
//! - A time-bounded page cache that never changes results

use std::collections::BTreeMap;
use tracing::{debug, info};
use types::ids::Address;

use crate::config::WhitelistConfig;
use crate::errors::WhitelistError;
use crate::events::{AssetDelisted, AssetListed, ContractEvent};
use crate::host::Host;
use crate::security::AccessControl;

#[derive(Debug, Clone)]
struct CachedPage {
    generation: u64,
    stored_at: u64,
    page: Vec<Address>,
}

/// Memoized `(offset, limit)` page results.
///
/// Entries expire after `ttl_secs` and are discarded whenever the whitelist
/// changes (tracked by a generation counter), so a hit always equals what
/// the uncached path would return.
#[derive(Debug, Clone)]
pub struct PageCache {
    ttl_secs: u64,
    capacity: usize,
    entries: BTreeMap<(usize, usize), CachedPage>,
    hits: u64,
    misses: u64,
}

impl PageCache {
    pub fn new(ttl_secs: u64, capacity: usize) -> Self {
        Self {
            ttl_secs,
            capacity,
            entries: BTreeMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: (usize, usize), generation: u64, now: u64) -> Option<Vec<Address>> {
        let fresh = self.entries.get(&key).and_then(|entry| {
            let live = entry.generation == generation
                && now < entry.stored_at.saturating_add(self.ttl_secs);
            live.then(|| entry.page.clone())
        });
        match fresh {
            Some(page) => {
                self.hits += 1;
                Some(page)
            }
            None => {
                self.entries.remove(&key);
                self.misses += 1;
                None
            }
        }
    }

    fn put(&mut self, key: (usize, usize), generation: u64, now: u64, page: Vec<Address>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CachedPage {
                generation,
                stored_at: now,
                page,
            },
        );
    }

    /// Drop every cached page.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// The set of whitelisted assets.
///
/// Assets are kept in insertion order; removal swaps the last asset into the
/// freed slot, so pagination order is stable between mutations.
#[derive(Debug, Clone)]
pub struct AssetWhitelist {
    address: Address,
    access_control: AccessControl,
    config: WhitelistConfig,
    assets: Vec<Address>,
    index: BTreeMap<Address, usize>,
    generation: u64,
    cache: PageCache,
}

impl AssetWhitelist {
    /// Create an empty whitelist owned by `owner`.
    pub fn new(address: Address, owner: Address, config: WhitelistConfig) -> Self {
        let cache = PageCache::new(config.cache_ttl_secs, config.cache_entries);
        Self {
            address,
            access_control: AccessControl::new(owner),
            config,
            assets: Vec::new(),
            index: BTreeMap::new(),
            generation: 0,
            cache,
        }
    }

    /// Identity of this whitelist; vaults record which whitelist they are bound to.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.access_control.owner()
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<(), WhitelistError> {
        if !self.access_control.transfer_ownership(caller, new_owner) {
            return Err(WhitelistError::Unauthorized);
        }
        Ok(())
    }

    // ───────────────────────── Membership ─────────────────────────

    /// Add an asset. Owner-only.
    pub fn add(&mut self, caller: Address, asset: Address, host: &mut Host) -> Result<(), WhitelistError> {
        if !self.access_control.is_owner(caller) {
            return Err(WhitelistError::Unauthorized);
        }
        self.check_candidate(asset, host)?;
        self.insert(asset);
        host.emit(ContractEvent::AssetListed(AssetListed { actor: caller, asset }));
        info!(asset = %asset, count = self.assets.len(), "Asset whitelisted");
        Ok(())
    }

    /// Remove an asset. Owner-only.
    ///
    /// Balances already custodied under the asset are unaffected.
    pub fn remove(&mut self, caller: Address, asset: Address, host: &mut Host) -> Result<(), WhitelistError> {
        if !self.access_control.is_owner(caller) {
            return Err(WhitelistError::Unauthorized);
        }
        let slot = self
            .index
            .remove(&asset)
            .ok_or(WhitelistError::NotListed { asset })?;
        self.assets.swap_remove(slot);
        if let Some(moved) = self.assets.get(slot) {
            self.index.insert(*moved, slot);
        }
        self.bump_generation();
        host.emit(ContractEvent::AssetDelisted(AssetDelisted { actor: caller, asset }));
        info!(asset = %asset, count = self.assets.len(), "Asset removed from whitelist");
        Ok(())
    }

    /// Add many assets at once. Owner-only.
    ///
    /// Invalid entries (null, already listed, no contract code) are skipped
    /// rather than failing the batch. Returns the number of assets added.
    pub fn add_batch(
        &mut self,
        caller: Address,
        assets: &[Address],
        host: &mut Host,
    ) -> Result<usize, WhitelistError> {
        if !self.access_control.is_owner(caller) {
            return Err(WhitelistError::Unauthorized);
        }
        if assets.len() > self.config.max_batch {
            return Err(WhitelistError::BatchTooLarge {
                len: assets.len(),
                max: self.config.max_batch,
            });
        }

        let mut added = 0;
        for &asset in assets {
            match self.check_candidate(asset, host) {
                Ok(()) => {
                    self.insert(asset);
                    host.emit(ContractEvent::AssetListed(AssetListed { actor: caller, asset }));
                    added += 1;
                }
                Err(reason) => {
                    debug!(asset = %asset, %reason, "Skipping batch entry");
                }
            }
        }
        info!(requested = assets.len(), added, "Whitelist batch processed");
        Ok(added)
    }

    pub fn contains(&self, asset: Address) -> bool {
        self.index.contains_key(&asset)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    // ───────────────────────── Pagination ─────────────────────────

    /// Page through listed assets in insertion order.
    ///
    /// `limit` is capped at the configured maximum page size; a zero limit
    /// yields an empty page.
    pub fn page(&self, offset: usize, limit: usize) -> Result<Vec<Address>, WhitelistError> {
        let count = self.assets.len();
        if offset >= count {
            return Err(WhitelistError::OutOfRange { offset, count });
        }
        let limit = limit.min(self.config.max_page);
        let end = offset.saturating_add(limit).min(count);
        Ok(self.assets[offset..end].to_vec())
    }

    /// Cached variant of [`AssetWhitelist::page`]; `now` is the host timestamp.
    pub fn page_cached(&mut self, offset: usize, limit: usize, now: u64) -> Result<Vec<Address>, WhitelistError> {
        let key = (offset, limit.min(self.config.max_page));
        if let Some(page) = self.cache.get(key, self.generation, now) {
            debug!(offset, limit = key.1, "Whitelist page cache hit");
            return Ok(page);
        }
        let page = self.page(offset, limit)?;
        self.cache.put(key, self.generation, now, page.clone());
        Ok(page)
    }

    /// Discard all cached pages.
    pub fn invalidate_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    // ───────────────────────── Internal ─────────────────────────

    fn check_candidate(&self, asset: Address, host: &Host) -> Result<(), WhitelistError> {
        if asset.is_zero() {
            return Err(WhitelistError::InvalidIdentifier);
        }
        if !host.has_code(asset) {
            return Err(WhitelistError::NotAContract { asset });
        }
        if self.contains(asset) {
            return Err(WhitelistError::AlreadyListed { asset });
        }
        Ok(())
    }

    fn insert(&mut self, asset: Address) {
        self.index.insert(asset, self.assets.len());
        self.assets.push(asset);
        self.bump_generation();
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::from_label("owner")
    }

    fn setup(tokens: usize) -> (AssetWhitelist, Host, Vec<Address>) {
        let mut host = Host::new(1, 1_000);
        let assets = (0..tokens)
            .map(|i| host.deploy_token(&format!("TK{}", i), 6))
            .collect();
        let whitelist = AssetWhitelist::new(Address::from_label("whitelist"), owner(), WhitelistConfig::default());
        (whitelist, host, assets)
    }

    #[test]
    fn test_add_and_contains() {
        let (mut wl, mut host, assets) = setup(1);
        wl.add(owner(), assets[0], &mut host).unwrap();
        assert!(wl.contains(assets[0]));
        assert_eq!(wl.len(), 1);
        assert!(matches!(host.events()[0], ContractEvent::AssetListed(_)));
    }

    #[test]
    fn test_add_rejects_zero_and_non_contract() {
        let (mut wl, mut host, _) = setup(0);
        assert_eq!(wl.add(owner(), Address::ZERO, &mut host), Err(WhitelistError::InvalidIdentifier));
        let eoa = Address::from_label("eoa");
        assert_eq!(wl.add(owner(), eoa, &mut host), Err(WhitelistError::NotAContract { asset: eoa }));
    }

    #[test]
    fn test_add_twice_fails_without_state_change() {
        let (mut wl, mut host, assets) = setup(1);
        wl.add(owner(), assets[0], &mut host).unwrap();
        let before = host.events().len();
        assert_eq!(
            wl.add(owner(), assets[0], &mut host),
            Err(WhitelistError::AlreadyListed { asset: assets[0] })
        );
        assert_eq!(wl.len(), 1);
        assert_eq!(host.events().len(), before);
    }

    #[test]
    fn test_add_unauthorized() {
        let (mut wl, mut host, assets) = setup(1);
        let result = wl.add(Address::from_label("eve"), assets[0], &mut host);
        assert_eq!(result, Err(WhitelistError::Unauthorized));
    }

    #[test]
    fn test_remove() {
        let (mut wl, mut host, assets) = setup(3);
        for a in &assets {
            wl.add(owner(), *a, &mut host).unwrap();
        }
        wl.remove(owner(), assets[0], &mut host).unwrap();
        assert!(!wl.contains(assets[0]));
        // Last asset moved into the freed slot.
        assert_eq!(wl.page(0, 10).unwrap(), vec![assets[2], assets[1]]);
        assert_eq!(
            wl.remove(owner(), assets[0], &mut host),
            Err(WhitelistError::NotListed { asset: assets[0] })
        );
    }

    #[test]
    fn test_add_batch_skips_invalid_entries() {
        let (mut wl, mut host, assets) = setup(3);
        wl.add(owner(), assets[0], &mut host).unwrap();
        let batch = vec![
            assets[0],                      // already listed
            Address::ZERO,                  // null
            Address::from_label("no-code"), // not a contract
            assets[1],
            assets[2],
            assets[2], // duplicate within the batch
        ];
        assert_eq!(wl.add_batch(owner(), &batch, &mut host), Ok(2));
        assert_eq!(wl.len(), 3);
    }

    #[test]
    fn test_add_batch_too_large() {
        let (mut wl, mut host, _) = setup(0);
        let batch = vec![Address::from_label("x"); 51];
        assert_eq!(
            wl.add_batch(owner(), &batch, &mut host),
            Err(WhitelistError::BatchTooLarge { len: 51, max: 50 })
        );
    }

    #[test]
    fn test_page_boundaries() {
        let (mut wl, mut host, assets) = setup(5);
        wl.add_batch(owner(), &assets, &mut host).unwrap();

        assert_eq!(wl.page(0, 2).unwrap(), assets[0..2].to_vec());
        assert_eq!(wl.page(2, 2).unwrap(), assets[2..4].to_vec());
        assert_eq!(wl.page(4, 2).unwrap(), assets[4..5].to_vec());
        assert_eq!(wl.page(1, usize::MAX).unwrap(), assets[1..].to_vec());
        assert_eq!(wl.page(3, 0).unwrap(), Vec::<Address>::new());
        assert_eq!(wl.page(5, 1), Err(WhitelistError::OutOfRange { offset: 5, count: 5 }));
    }

    #[test]
    fn test_page_limit_capped() {
        let mut host = Host::new(1, 1_000);
        let config = WhitelistConfig {
            max_page: 3,
            ..WhitelistConfig::default()
        };
        let mut wl = AssetWhitelist::new(Address::from_label("whitelist"), owner(), config);
        let assets: Vec<Address> = (0..5).map(|i| host.deploy_token(&format!("T{}", i), 6)).collect();
        wl.add_batch(owner(), &assets, &mut host).unwrap();
        assert_eq!(wl.page(0, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_page_cached_matches_uncached() {
        let (mut wl, mut host, assets) = setup(4);
        wl.add_batch(owner(), &assets, &mut host).unwrap();

        let first = wl.page_cached(1, 2, 1_000).unwrap();
        let second = wl.page_cached(1, 2, 1_010).unwrap();
        assert_eq!(first, wl.page(1, 2).unwrap());
        assert_eq!(first, second);
        assert_eq!(wl.cache().hits(), 1);
        assert_eq!(wl.cache().misses(), 1);
    }

    #[test]
    fn test_page_cache_expires() {
        let (mut wl, mut host, assets) = setup(2);
        wl.add_batch(owner(), &assets, &mut host).unwrap();
        wl.page_cached(0, 2, 1_000).unwrap();
        wl.page_cached(0, 2, 1_000 + DEFAULT_TTL).unwrap();
        assert_eq!(wl.cache().hits(), 0, "Expired entry must not be served");
    }

    const DEFAULT_TTL: u64 = crate::config::DEFAULT_PAGE_CACHE_TTL_SECS;

    #[test]
    fn test_page_cache_invalidated_by_mutation() {
        let (mut wl, mut host, assets) = setup(3);
        wl.add(owner(), assets[0], &mut host).unwrap();
        assert_eq!(wl.page_cached(0, 10, 1_000).unwrap(), vec![assets[0]]);

        wl.add(owner(), assets[1], &mut host).unwrap();
        assert_eq!(wl.page_cached(0, 10, 1_001).unwrap(), vec![assets[0], assets[1]]);
    }

    #[test]
    fn test_page_cache_external_invalidation() {
        let (mut wl, mut host, assets) = setup(1);
        wl.add(owner(), assets[0], &mut host).unwrap();
        wl.page_cached(0, 1, 1_000).unwrap();
        assert_eq!(wl.cache().len(), 1);
        wl.invalidate_cache();
        assert!(wl.cache().is_empty());
    }

    #[test]
    fn test_page_cache_does_not_store_errors() {
        let (mut wl, _, _) = setup(0);
        assert!(wl.page_cached(0, 1, 1_000).is_err());
        assert!(wl.cache().is_empty());
    }
}
