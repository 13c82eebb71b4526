//! Cart state synchronization and option validation engine.
//!
//! Keeps a shopper's cart consistent across every surface of the
//! storefront: a [`CartSyncManager`] reconciles local state with the
//! remote cart store and fans out counter changes, [`CartWorkflows`]
//! runs optimistic mutations with rollback, and [`validation`] gates
//! checkout on required product options.
//!
//! The remote store and the persistent cache are trait seams
//! ([`RemoteCartStore`], [`LocalCache`]) so tests run against in-memory
//! doubles and the binary wires in HTTP and file-backed implementations.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
pub mod store;
pub mod sync;
pub mod types;
pub mod validation;
pub mod workflows;

pub(crate) mod state;

pub use cache::{JsonFileCache, LocalCache, MemoryCache};
pub use config::{CartConfig, CartStoreConfig, ConfigError};
pub use error::{CacheError, StoreError};
pub use events::{CartEvent, ListenerHandle};
pub use store::{HttpCartStore, HttpCatalog, ProductCatalog, RemoteCartStore};
pub use sync::CartSyncManager;
pub use types::{
    Attachments, CartIdentity, CartLineItem, CartSnapshot, ItemWrite, NewItem, OptionField,
    OptionKind, ProductSnapshot, SyncCounters,
};
pub use validation::{CheckoutReport, ItemGaps};
pub use workflows::{AddItemError, CartWorkflows, ClearConfirmation, MutationOutcome};
