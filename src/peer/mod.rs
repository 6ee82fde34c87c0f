//! Upstream peers
//!
//! Validators are stateful: each one owns a [`PeerStateCache`] refreshed in the
//! background and a [`PaymentTxGenerator`] signing from its payment account.
//! Builders are plain pass-throughs keyed by address.

mod builder;
mod payment;
mod snapshot;
mod validator;

pub use builder::BuilderPeer;
pub use payment::{PaymentTxGenerator, PAY_BID_TX_GAS_LIMIT};
pub use snapshot::{
    AccountState, PeerSnapshot, PeerStateCache, RefreshPhase, Refresher, SnapshotHandle,
};
pub use validator::ValidatorPeer;
