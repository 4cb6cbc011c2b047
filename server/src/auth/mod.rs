/// Token lifecycle and session transport
///
/// - `tokens`: issue / rotate / revoke / validate JWT pairs
/// - `store`: refresh-token records and their state machine
/// - `identity`: registered principals
/// - `transport`: cookies and headers that carry a pair
pub mod identity;
pub mod store;
pub mod tokens;
pub mod transport;

pub use identity::{IdentityStore, MemoryIdentityStore, NewIdentity, Principal};
pub use store::{MemoryTokenStore, TokenRecord, TokenState, TokenStore};
pub use tokens::{Clock, ManualClock, SystemClock, TokenPair, TokenPolicy, TokenService};
pub use transport::{SessionCarrier, SessionTransport};
