//! Cast orchestration core.
//!
//! Everything needed to reliably drive an intermittently-visible cast
//! appliance through a load/confirm protocol: discovery with caching,
//! a breaker-guarded connection pool, a debouncing playback controller
//! and a single-flight broadcast guard. [`CastManager`] composes the
//! pieces and is the only type the API layer talks to.

pub mod breaker;
pub mod broadcast;
pub mod castv2;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod mdns;
pub mod playback;
pub mod pool;
pub mod probe;
pub mod session;
#[cfg(test)]
pub(crate) mod testutil;

pub use breaker::{BreakerRegistry, CircuitBreaker};
pub use broadcast::BroadcastController;
pub use discovery::{DeviceCandidate, DiscoveryManager, DiscoveryOutcome, EnumerationStrategy};
pub use error::CastError;
pub use manager::CastManager;
pub use playback::{PlaybackController, PlaybackError, PlaybackReport};
pub use pool::ConnectionPool;
pub use session::{MediaSession, SessionError, SessionFactory};
