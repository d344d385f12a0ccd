//! Ports: the seams between the queue and the outside world.
//!
//! - `Store`: the remote scored-set store (Redis, or in-memory for tests)
//! - `Clock`: current time
//! - `IdGenerator`: task ids

pub mod clock;
pub mod id_generator;
pub mod store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::store::{ScriptHandle, Store};
