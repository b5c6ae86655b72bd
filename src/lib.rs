//! A tangle ledger core: transaction admission, cumulative weights, MCMC tip
//! selection and ledger consistency checks over a DAG of tryte-encoded
//! transactions.

pub mod config;
pub mod dag;
pub mod error;
pub mod ledger;
pub mod mempool;
pub mod node;
pub mod tipselection;

pub use config::{validate_config, ConfigValidation, TangleConfig};
pub use dag::{Transaction, TransactionBuilder, TryteHash, TangleStore};
pub use error::{Result, TangleError};
pub use ledger::{Consistency, ConsistencyChecker, Snapshot, SnapshotState};
pub use mempool::{PendingPool, Submission};
pub use node::{Attachment, SimulationParams, SimulationReport, TangleNode};
pub use tipselection::{TipSelection, TipSelectionConfig, TipSelector};
