//! Item registry
//!
//! Owns the population of reconciled items and keeps the discrepant-ID set
//! in sync with every mutation that goes through it.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use super::id::ItemId;
use super::item::Item;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Item already exists: {0}")]
    DuplicateItem(ItemId),

    #[error("Item not found: {0}")]
    UnknownItem(ItemId),
}

/// Items by ID, plus the IDs of those not yet at their desired state
#[derive(Debug, Clone)]
pub struct ItemRegistry<T> {
    items: BTreeMap<ItemId, Item<T>>,
    discrepant: BTreeSet<ItemId>,
}

impl<T> Default for ItemRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ItemRegistry<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            discrepant: BTreeSet::new(),
        }
    }

    /// Adds an item, returning its ID
    pub fn add_item(&mut self, item: Item<T>) -> Result<ItemId, RegistryError> {
        let id = item.id().clone();
        if self.items.contains_key(&id) {
            return Err(RegistryError::DuplicateItem(id));
        }

        if item.is_discrepant() {
            self.discrepant.insert(id.clone());
        }
        self.items.insert(id.clone(), item);
        Ok(id)
    }

    /// Removes an item, handing it back to the caller
    pub fn remove_item(&mut self, id: &ItemId) -> Result<Item<T>, RegistryError> {
        let item = self
            .items
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownItem(id.clone()))?;
        self.discrepant.remove(id);
        Ok(item)
    }

    /// Sets both states of an item and refreshes its discrepancy
    pub fn update_item_states(
        &mut self,
        id: &ItemId,
        curr: impl Into<String>,
        desired: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownItem(id.clone()))?;
        item.set_states(curr, desired);

        if item.is_discrepant() {
            self.discrepant.insert(id.clone());
        } else {
            self.discrepant.remove(id);
        }
        Ok(())
    }

    pub fn get_item(&self, id: &ItemId) -> Result<&Item<T>, RegistryError> {
        self.items
            .get(id)
            .ok_or_else(|| RegistryError::UnknownItem(id.clone()))
    }

    /// Returns all item IDs in sorted order
    pub fn get_item_ids(&self) -> Vec<ItemId> {
        self.items.keys().cloned().collect()
    }

    /// Returns all items in ID order
    pub fn get_items(&self) -> Vec<(&ItemId, &Item<T>)> {
        self.items.iter().collect()
    }

    pub fn get_item_curr_state(&self, id: &ItemId) -> Result<&str, RegistryError> {
        self.get_item(id).map(Item::curr_state)
    }

    pub fn get_item_desired_state(&self, id: &ItemId) -> Result<&str, RegistryError> {
        self.get_item(id).map(Item::desired_state)
    }

    /// Returns a snapshot of the discrepant IDs in sorted order
    pub fn discrepant_ids(&self) -> Vec<ItemId> {
        self.discrepant.iter().cloned().collect()
    }

    pub fn discrepant_count(&self) -> usize {
        self.discrepant.len()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mutable access for the reconciler; bookkeeping must be refreshed
    /// through [`update_item_states`](Self::update_item_states) afterwards.
    pub(crate) fn item_mut(&mut self, id: &ItemId) -> Option<&mut Item<T>> {
        self.items.get_mut(id)
    }

    /// Takes items out of the registry so they can be reconciled elsewhere.
    /// IDs that are not present are skipped.
    pub(crate) fn take_items(&mut self, ids: &[ItemId]) -> Vec<Item<T>> {
        ids.iter()
            .filter_map(|id| {
                self.discrepant.remove(id);
                self.items.remove(id)
            })
            .collect()
    }

    /// Puts back items previously taken with [`take_items`](Self::take_items)
    pub(crate) fn restore_items(&mut self, items: Vec<Item<T>>) {
        for item in items {
            let id = item.id().clone();
            if item.is_discrepant() {
                self.discrepant.insert(id.clone());
            } else {
                self.discrepant.remove(&id);
            }
            self.items.insert(id, item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, curr: &str, desired: &str) -> Item<()> {
        Item::with_id(ItemId::new(id).unwrap(), curr, desired, ())
    }

    fn id(raw: &str) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    #[test]
    fn empty_registry() {
        let registry: ItemRegistry<()> = ItemRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.discrepant_ids().is_empty());
    }

    #[test]
    fn add_tracks_discrepancy() {
        let mut registry = ItemRegistry::new();
        registry.add_item(item("a", "empty", "done")).unwrap();
        registry.add_item(item("b", "done", "done")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.discrepant_ids(), vec![id("a")]);
    }

    #[test]
    fn duplicate_item_rejected_and_registry_unchanged() {
        let mut registry = ItemRegistry::new();
        registry.add_item(item("a", "empty", "done")).unwrap();

        let result = registry.add_item(item("a", "done", "done"));
        assert_eq!(result, Err(RegistryError::DuplicateItem(id("a"))));
        assert_eq!(registry.get_item_curr_state(&id("a")), Ok("empty"));
        assert_eq!(registry.discrepant_count(), 1);
    }

    #[test]
    fn remove_item() {
        let mut registry = ItemRegistry::new();
        registry.add_item(item("a", "empty", "done")).unwrap();

        let removed = registry.remove_item(&id("a")).unwrap();
        assert_eq!(removed.curr_state(), "empty");
        assert!(registry.discrepant_ids().is_empty());
        assert_eq!(registry.get_item(&id("a")).unwrap_err(), RegistryError::UnknownItem(id("a")));
    }

    #[test]
    fn remove_unknown_item() {
        let mut registry: ItemRegistry<()> = ItemRegistry::new();
        assert_eq!(
            registry.remove_item(&id("ghost")).unwrap_err(),
            RegistryError::UnknownItem(id("ghost"))
        );
    }

    #[test]
    fn update_recomputes_membership() {
        let mut registry = ItemRegistry::new();
        registry.add_item(item("a", "empty", "done")).unwrap();

        registry.update_item_states(&id("a"), "done", "done").unwrap();
        assert!(registry.discrepant_ids().is_empty());

        registry.update_item_states(&id("a"), "done", "archived").unwrap();
        assert_eq!(registry.discrepant_ids(), vec![id("a")]);
        assert_eq!(registry.get_item_desired_state(&id("a")), Ok("archived"));
    }

    #[test]
    fn update_unknown_item() {
        let mut registry: ItemRegistry<()> = ItemRegistry::new();
        assert_eq!(
            registry.update_item_states(&id("ghost"), "a", "b"),
            Err(RegistryError::UnknownItem(id("ghost")))
        );
    }

    #[test]
    fn readers_are_id_ordered() {
        let mut registry = ItemRegistry::new();
        registry.add_item(item("c", "x", "y")).unwrap();
        registry.add_item(item("a", "x", "x")).unwrap();
        registry.add_item(item("b", "x", "y")).unwrap();

        assert_eq!(registry.get_item_ids(), vec![id("a"), id("b"), id("c")]);
        let listed: Vec<_> = registry.get_items().into_iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(listed, vec!["a", "b", "c"]);
        assert_eq!(registry.discrepant_ids(), vec![id("b"), id("c")]);
    }

    #[test]
    fn take_and_restore_round_trip_bookkeeping() {
        let mut registry = ItemRegistry::new();
        registry.add_item(item("a", "empty", "done")).unwrap();
        registry.add_item(item("b", "empty", "done")).unwrap();

        let mut taken = registry.take_items(&[id("a"), id("ghost")]);
        assert_eq!(taken.len(), 1);
        assert!(!registry.contains(&id("a")));
        assert_eq!(registry.discrepant_ids(), vec![id("b")]);

        taken[0].set_curr_state("done");
        registry.restore_items(taken);
        assert!(registry.contains(&id("a")));
        assert_eq!(registry.discrepant_ids(), vec![id("b")]);
    }
}
