//! String encoding for values persisted in the store.
//!
//! Values travel through the store as JSON text. The absent value (`None`)
//! has its own literal token so that "stored as absent" stays distinct from
//! "no entry at all" and from a stored JSON `null`.

mod codec;

pub use codec::{decode, encode, ABSENT_TOKEN};
