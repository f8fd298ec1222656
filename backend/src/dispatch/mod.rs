pub mod delivery;
pub mod guard;
pub mod scheduler;

pub use guard::{DispatchGuard, GuardSnapshot};
pub use scheduler::{DispatchTotals, Dispatcher, DispatcherSettings};
