//! Shared in-memory cart state.
//!
//! The item list is the one cross-surface mutable resource besides the
//! local cache. Every optimistic edit bumps a per-item monotonic sequence
//! number; reconciliation compares sequence numbers captured before a fetch
//! against current ones, so a stale remote response can never overwrite a
//! newer optimistic edit.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use sea_fennel_core::ItemId;

use crate::types::CartLineItem;

/// Per-item edit sequence table, captured before a remote fetch.
pub(crate) type SeqTable = HashMap<ItemId, u64>;

#[derive(Default)]
struct StateInner {
    items: Vec<CartLineItem>,
    seqs: SeqTable,
}

/// In-memory item list plus edit sequencing.
#[derive(Default)]
pub(crate) struct CartState {
    inner: RwLock<StateInner>,
}

impl CartState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StateInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StateInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current item list.
    pub(crate) fn items(&self) -> Vec<CartLineItem> {
        self.read().items.clone()
    }

    /// Snapshot of a single item.
    pub(crate) fn item(&self, id: ItemId) -> Option<CartLineItem> {
        self.read().items.iter().find(|i| i.id == id).cloned()
    }

    /// Current sequence table, captured before issuing a fetch.
    pub(crate) fn seq_table(&self) -> SeqTable {
        self.read().seqs.clone()
    }

    fn bump(inner: &mut StateInner, id: ItemId) {
        *inner.seqs.entry(id).or_insert(0) += 1;
    }

    /// Optimistically mutate an item in place, bumping its sequence.
    ///
    /// Returns `(previous, updated)` clones for rollback, or `None` when the
    /// item is not in the cart.
    pub(crate) fn update_item<F>(
        &self,
        id: ItemId,
        mutate: F,
    ) -> Option<(CartLineItem, CartLineItem)>
    where
        F: FnOnce(&mut CartLineItem),
    {
        let mut inner = self.write();
        let item = inner.items.iter_mut().find(|i| i.id == id)?;
        let previous = item.clone();
        mutate(item);
        let updated = item.clone();
        Self::bump(&mut inner, id);
        Some((previous, updated))
    }

    /// Optimistically remove an item, bumping its sequence so a fetch that
    /// started earlier cannot resurrect it.
    pub(crate) fn remove_item(&self, id: ItemId) -> Option<(usize, CartLineItem)> {
        let mut inner = self.write();
        let index = inner.items.iter().position(|i| i.id == id)?;
        let removed = inner.items.remove(index);
        Self::bump(&mut inner, id);
        Some((index, removed))
    }

    /// Reinsert a removed item at its original position (rollback).
    pub(crate) fn insert_at(&self, index: usize, item: CartLineItem) {
        let mut inner = self.write();
        let id = item.id;
        let index = index.min(inner.items.len());
        inner.items.insert(index, item);
        Self::bump(&mut inner, id);
    }

    /// Append a server-confirmed item (add-to-cart path).
    pub(crate) fn push(&self, item: CartLineItem) {
        let mut inner = self.write();
        let id = item.id;
        inner.items.retain(|i| i.id != id);
        inner.items.push(item);
        Self::bump(&mut inner, id);
    }

    /// Remove every item (optimistic clear), returning the previous list
    /// for rollback.
    pub(crate) fn take_all(&self) -> Vec<CartLineItem> {
        let mut inner = self.write();
        let previous = std::mem::take(&mut inner.items);
        for item in &previous {
            *inner.seqs.entry(item.id).or_insert(0) += 1;
        }
        previous
    }

    /// Replace the whole list (clear rollback).
    pub(crate) fn replace_all(&self, items: Vec<CartLineItem>) {
        let mut inner = self.write();
        for item in &items {
            *inner.seqs.entry(item.id).or_insert(0) += 1;
        }
        inner.items = items;
    }

    /// Merge a fetched authoritative list into local state.
    ///
    /// `at_fetch` is the sequence table captured before the fetch was
    /// issued. Items whose sequence advanced during the fetch keep their
    /// local version (or stay deleted); everything else takes the fetched
    /// version. Fetched order wins for untouched items.
    pub(crate) fn reconcile(&self, fetched: Vec<CartLineItem>, at_fetch: &SeqTable) {
        let mut inner = self.write();
        let mut next = Vec::with_capacity(fetched.len());
        for remote in fetched {
            let id = remote.id;
            let current = inner.seqs.get(&id).copied().unwrap_or(0);
            let snapshot = at_fetch.get(&id).copied().unwrap_or(0);
            if current == snapshot {
                next.push(remote);
            } else if let Some(local) = inner.items.iter().find(|i| i.id == id) {
                // Edited while the fetch was in flight: the optimistic
                // version is newer than this response.
                next.push(local.clone());
            }
            // Locally removed mid-fetch: drop the stale remote copy.
        }
        // Keep local items the server does not know about yet only if they
        // were touched during the fetch window.
        for local in &inner.items {
            let id = local.id;
            if next.iter().any(|i| i.id == id) {
                continue;
            }
            let current = inner.seqs.get(&id).copied().unwrap_or(0);
            let snapshot = at_fetch.get(&id).copied().unwrap_or(0);
            if current != snapshot {
                next.push(local.clone());
            }
        }
        inner.items = next;
        // Sequences exist to detect edits racing a fetch; once an item has
        // left the reconciled list no fetch in flight can still carry it, so
        // its entry would only accumulate.
        let kept: HashSet<ItemId> = inner.items.iter().map(|i| i.id).collect();
        inner.seqs.retain(|id, _| kept.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attachments, ProductSnapshot};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sea_fennel_core::ProductId;
    use std::collections::BTreeMap;

    fn item(id: i64, quantity: u32) -> CartLineItem {
        CartLineItem {
            id: ItemId::new(id),
            product_id: ProductId::new(id),
            quantity,
            selected_options: BTreeMap::new(),
            options_pricing: BTreeMap::new(),
            attachments: Attachments::default(),
            product: Some(ProductSnapshot {
                id: ProductId::new(id),
                title: format!("Product {id}"),
                price: Decimal::from(10),
                stock: None,
                options: Vec::new(),
            }),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_reconcile_takes_fetched_for_untouched_items() {
        let state = CartState::new();
        state.push(item(1, 1));
        let at_fetch = state.seq_table();

        state.reconcile(vec![item(1, 4)], &at_fetch);
        assert_eq!(state.item(ItemId::new(1)).map(|i| i.quantity), Some(4));
    }

    #[test]
    fn test_stale_fetch_does_not_overwrite_newer_edit() {
        let state = CartState::new();
        state.push(item(1, 1));
        let at_fetch = state.seq_table();

        // Local edit lands while the fetch is in flight.
        state.update_item(ItemId::new(1), |i| i.quantity = 7);

        // The (stale) response carries the pre-edit quantity.
        state.reconcile(vec![item(1, 1)], &at_fetch);
        assert_eq!(state.item(ItemId::new(1)).map(|i| i.quantity), Some(7));
    }

    #[test]
    fn test_reconcile_does_not_resurrect_removed_item() {
        let state = CartState::new();
        state.push(item(1, 1));
        let at_fetch = state.seq_table();

        state.remove_item(ItemId::new(1));
        state.reconcile(vec![item(1, 1)], &at_fetch);
        assert!(state.item(ItemId::new(1)).is_none());
    }

    #[test]
    fn test_reconcile_prunes_sequences_for_departed_items() {
        let state = CartState::new();
        state.push(item(1, 1));
        state.push(item(2, 1));
        let at_fetch = state.seq_table();

        state.remove_item(ItemId::new(2));
        state.reconcile(vec![item(1, 1)], &at_fetch);

        let seqs = state.seq_table();
        assert!(seqs.contains_key(&ItemId::new(1)));
        assert!(
            !seqs.contains_key(&ItemId::new(2)),
            "departed items must not accumulate sequence entries"
        );
    }

    #[test]
    fn test_rollback_reinserts_at_original_index() {
        let state = CartState::new();
        state.push(item(1, 1));
        state.push(item(2, 1));
        state.push(item(3, 1));

        let (index, removed) = state.remove_item(ItemId::new(2)).expect("removed");
        assert_eq!(index, 1);
        state.insert_at(index, removed);

        let ids: Vec<i64> = state.items().iter().map(|i| i.id.as_i64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
