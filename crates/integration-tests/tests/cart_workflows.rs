//! Integration tests for the cart mutation workflows.
//!
//! Exercises the optimistic apply / remote write / reconcile-or-rollback
//! contract against the in-memory store double, including failure injection
//! and the debounced note pipeline.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;
use sea_fennel_core::ItemId;

use sea_fennel_cart::{AddItemError, CartIdentity, ClearConfirmation, MutationOutcome, NewItem};
use sea_fennel_integration_tests::{MemoryCartStore, engine, line_item, product};

fn seeded_store() -> MemoryCartStore {
    let store = MemoryCartStore::new();
    store.register_product(product(1, Decimal::from(10)));
    store.seed_cart(
        CartIdentity::Guest,
        vec![line_item(1, Some(product(1, Decimal::from(10))), 2)],
    );
    store
}

// =============================================================================
// Quantity
// =============================================================================

#[tokio::test]
async fn test_set_quantity_commits_and_updates_counters() {
    let store = seeded_store();
    let (manager, workflows) = engine(store.clone());
    manager.sync_with_server().await;

    let outcome = workflows.set_quantity(ItemId::new(1), 5).await;
    assert_eq!(outcome, MutationOutcome::Committed);
    assert_eq!(manager.counters().last_cart_count, 5);
    assert_eq!(store.stored_items(CartIdentity::Guest)[0].quantity, 5);
}

#[tokio::test]
async fn test_set_quantity_clamps_to_one() {
    let store = seeded_store();
    let (manager, workflows) = engine(store);
    manager.sync_with_server().await;

    let outcome = workflows.set_quantity(ItemId::new(1), 0).await;
    assert_eq!(outcome, MutationOutcome::Committed);
    assert_eq!(manager.items()[0].quantity, 1);
}

#[tokio::test]
async fn test_set_quantity_keeps_optimistic_value_on_write_failure() {
    let store = seeded_store();
    let (manager, workflows) = engine(store.clone());
    manager.sync_with_server().await;

    store.set_fail_writes(true);
    let outcome = workflows.set_quantity(ItemId::new(1), 7).await;
    assert!(matches!(outcome, MutationOutcome::AppliedLocally { .. }));

    // The optimistic value stays; retrying the same edit is safe.
    assert_eq!(manager.items()[0].quantity, 7);
    assert_eq!(manager.counters().last_cart_count, 7);
    assert_eq!(store.stored_items(CartIdentity::Guest)[0].quantity, 2);
}

#[tokio::test]
async fn test_mutating_unknown_item_reports_no_such_item() {
    let (manager, workflows) = engine(seeded_store());
    manager.sync_with_server().await;

    let outcome = workflows.set_quantity(ItemId::new(99), 3).await;
    assert_eq!(outcome, MutationOutcome::NoSuchItem);
}

// =============================================================================
// Removal & Clear
// =============================================================================

#[tokio::test]
async fn test_remove_item_commits() {
    let store = seeded_store();
    let (manager, workflows) = engine(store.clone());
    manager.sync_with_server().await;

    let outcome = workflows.remove_item(ItemId::new(1)).await;
    assert_eq!(outcome, MutationOutcome::Committed);
    assert!(manager.items().is_empty());
    assert_eq!(manager.counters().last_cart_count, 0);
    assert!(store.stored_items(CartIdentity::Guest).is_empty());
}

#[tokio::test]
async fn test_remove_rollback_restores_item_with_single_error() {
    let store = MemoryCartStore::new();
    store.seed_cart(
        CartIdentity::Guest,
        vec![
            line_item(1, Some(product(1, Decimal::from(10))), 1),
            line_item(2, Some(product(2, Decimal::from(20))), 1),
            line_item(3, Some(product(3, Decimal::from(30))), 1),
        ],
    );
    let (manager, workflows) = engine(store.clone());
    manager.sync_with_server().await;

    store.set_fail_writes(true);
    let outcome = workflows.remove_item(ItemId::new(2)).await;

    // Exactly one error outcome, and the item is back where it was.
    let MutationOutcome::RolledBack { error } = outcome else {
        panic!("expected rollback, got {outcome:?}");
    };
    assert!(!error.is_empty());
    let items = manager.items();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1].id, ItemId::new(2));
    assert_eq!(manager.counters().last_cart_count, 3);
}

#[tokio::test]
async fn test_clear_cart_commits() {
    let store = seeded_store();
    let (manager, workflows) = engine(store.clone());
    manager.sync_with_server().await;

    let outcome = workflows.clear_cart(ClearConfirmation::confirmed()).await;
    assert_eq!(outcome, MutationOutcome::Committed);
    assert!(manager.items().is_empty());
    assert_eq!(manager.counters().last_cart_count, 0);
}

#[tokio::test]
async fn test_clear_cart_rolls_back_on_failure() {
    let store = seeded_store();
    let (manager, workflows) = engine(store.clone());
    manager.sync_with_server().await;

    store.set_fail_writes(true);
    let outcome = workflows.clear_cart(ClearConfirmation::confirmed()).await;
    assert!(matches!(outcome, MutationOutcome::RolledBack { .. }));
    assert_eq!(manager.items().len(), 1);
    assert_eq!(manager.counters().last_cart_count, 2);
}

// =============================================================================
// Options & Drafts
// =============================================================================

/// Option edits carry configurable fields, which guest carts do not keep
/// server-side, so these tests run on a signed-in cart.
fn seeded_user_store(user: sea_fennel_core::UserId) -> MemoryCartStore {
    let store = MemoryCartStore::new();
    store.register_product(product(1, Decimal::from(10)));
    store.seed_cart(
        CartIdentity::User(user),
        vec![line_item(1, Some(product(1, Decimal::from(10))), 2)],
    );
    store
}

#[tokio::test]
async fn test_set_option_merges_surcharge_into_totals() {
    let user = sea_fennel_core::UserId::new(4);
    let store = seeded_user_store(user);
    let (manager, workflows) = engine(store.clone());
    manager.sync_after_login(user).await;

    let outcome = workflows
        .set_option(
            ItemId::new(1),
            "engraving",
            "HB".to_string(),
            Some(Decimal::from(5)),
        )
        .await;
    assert_eq!(outcome, MutationOutcome::Committed);

    // Unit price 10 + 5 surcharge, quantity 2.
    assert_eq!(manager.counters().last_cart_value, Decimal::from(30));
    let stored = store.stored_items(CartIdentity::User(user));
    assert_eq!(
        stored[0].selected_options.get("engraving"),
        Some(&"HB".to_string())
    );
    assert_eq!(
        stored[0].options_pricing.get("engraving"),
        Some(&Decimal::from(5))
    );
}

#[tokio::test]
async fn test_option_draft_persists_for_prefill() {
    let user = sea_fennel_core::UserId::new(4);
    let store = seeded_user_store(user);
    let (manager, workflows) = engine(store);
    manager.sync_after_login(user).await;

    workflows
        .set_option(ItemId::new(1), "engraving", "HB".to_string(), None)
        .await;

    let draft = workflows
        .option_draft(sea_fennel_core::ProductId::new(1))
        .await
        .expect("draft persisted");
    assert_eq!(draft.get("engraving"), Some(&"HB".to_string()));
}

// =============================================================================
// Debounced Notes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_note_edits_coalesce_into_one_write() {
    let store = MemoryCartStore::new();
    store.register_product(product(1, Decimal::from(10)));
    store.seed_cart(
        CartIdentity::User(sea_fennel_core::UserId::new(4)),
        vec![line_item(1, Some(product(1, Decimal::from(10))), 1)],
    );
    let (manager, workflows) = engine(store.clone());
    manager
        .sync_after_login(sea_fennel_core::UserId::new(4))
        .await;

    // Two edits inside the inactivity window; only the second may be
    // written remotely.
    assert!(workflows.set_note(ItemId::new(1), "first".to_string()));
    tokio::time::advance(Duration::from_millis(200)).await;
    assert!(workflows.set_note(ItemId::new(1), "second".to_string()));

    tokio::time::advance(Duration::from_millis(1100)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    let stored = store.stored_items(CartIdentity::User(sea_fennel_core::UserId::new(4)));
    assert_eq!(stored[0].attachments.text, "second");
    assert_eq!(manager.items()[0].attachments.text, "second");
}

#[tokio::test]
async fn test_flush_note_writes_without_waiting() {
    let store = MemoryCartStore::new();
    store.register_product(product(1, Decimal::from(10)));
    store.seed_cart(
        CartIdentity::User(sea_fennel_core::UserId::new(4)),
        vec![line_item(1, Some(product(1, Decimal::from(10))), 1)],
    );
    let (manager, workflows) = engine(store.clone());
    manager
        .sync_after_login(sea_fennel_core::UserId::new(4))
        .await;

    assert!(workflows.set_note(ItemId::new(1), "gift wrap please".to_string()));
    let outcome = workflows.flush_note(ItemId::new(1)).await;
    assert_eq!(outcome, MutationOutcome::Committed);

    let stored = store.stored_items(CartIdentity::User(sea_fennel_core::UserId::new(4)));
    assert_eq!(stored[0].attachments.text, "gift wrap please");
}

// =============================================================================
// Add To Cart
// =============================================================================

#[tokio::test]
async fn test_add_item_updates_counters_and_store() {
    let store = MemoryCartStore::new();
    store.register_product(product(1, Decimal::from(15)));
    let (manager, workflows) = engine(store.clone());

    let item = workflows
        .add_item(NewItem::of(sea_fennel_core::ProductId::new(1), 2))
        .await
        .expect("add");
    assert_eq!(item.quantity, 2);
    assert_eq!(manager.counters().last_cart_count, 2);
    assert_eq!(manager.counters().last_cart_value, Decimal::from(30));
    assert_eq!(store.stored_items(CartIdentity::Guest).len(), 1);
}

#[tokio::test]
async fn test_add_item_enforces_min_interval() {
    let store = MemoryCartStore::new();
    store.register_product(product(1, Decimal::from(15)));
    let (_manager, workflows) = engine(store);

    workflows
        .add_item(NewItem::of(sea_fennel_core::ProductId::new(1), 1))
        .await
        .expect("first add");
    let second = workflows
        .add_item(NewItem::of(sea_fennel_core::ProductId::new(1), 1))
        .await;
    assert!(matches!(second, Err(AddItemError::TooSoon)));
}

#[tokio::test]
async fn test_guest_add_sends_reduced_payload() {
    let store = MemoryCartStore::new();
    store.register_product(product(1, Decimal::from(15)));
    let (_manager, workflows) = engine(store.clone());

    let mut selected = BTreeMap::new();
    selected.insert("engraving".to_string(), "HB".to_string());
    let item = NewItem {
        selected_options: selected,
        ..NewItem::of(sea_fennel_core::ProductId::new(1), 1)
    };
    workflows.add_item(item).await.expect("add");

    // Guest carts do not carry configurable fields server-side.
    let stored = store.stored_items(CartIdentity::Guest);
    assert!(stored[0].selected_options.is_empty());
}
