// src/dag/mod.rs
pub mod bundle;
pub mod hash;
pub mod store;
pub mod transaction;
pub mod trytes;
pub mod validation;

pub use bundle::Bundle;
pub use hash::{Address, BundleHash, TryteHash};
pub use store::{TangleState, TangleStore, TangleView};
pub use transaction::{Transaction, TransactionBuilder};
pub use validation::{BundleContext, LedgerValidator};
