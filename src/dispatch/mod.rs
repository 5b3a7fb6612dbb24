pub mod dispatcher;
pub mod locks;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use locks::KeyedLocks;
