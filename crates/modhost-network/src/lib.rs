//! # modhost-network
//!
//! TCP front-end for modhost. Provides:
//!
//! - A listener with one accept task and one receive task per connection
//! - A concurrent client set with cooperative, cancellation-driven shutdown
//! - [`HookEvents`], routing new-client and new-message events into the
//!   plugin hook dispatcher

pub mod client;
pub mod events;
pub mod pool;
pub mod server;

pub use client::{Client, ClientId, ClientInfo};
pub use events::{HookEvents, ServerEvents};
pub use pool::ClientPool;
pub use server::{Server, ServerOptions};
