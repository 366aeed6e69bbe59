//! Progress and diagnostics events
//!
//! The router, polisher and orchestrator publish [`PolishEvent`]s on an
//! optional [`EventBus`]. Nothing in the library depends on anyone
//! listening.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Router /   │────▶│  Event Bus   │────▶│  Subscribers │
//! │ Orchestrator │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{emit_to, EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::PolishEvent;
