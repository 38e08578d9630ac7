//! Network Layer
//!
//! Session plumbing around the deterministic delta stores: inbound
//! dispatch, late-join resync, and outbound frame aggregation over an
//! abstract transport.

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod resync;
pub mod session;
pub mod simulation;
pub mod throttle;
pub mod transport;

pub use aggregator::{AggregatorError, Frame, OutboundAggregator};
pub use config::SyncConfig;
pub use dispatcher::{Captured, DispatchError, DispatchMode, Dispatcher, HandlerContext, Severity};
pub use resync::{serve_chunks, ChunkOutcome, ResyncCoordinator, ResyncError, ResyncState};
pub use session::{SendError, SyncSession};
pub use simulation::{RecordingSimulation, SimEvent, Simulation};
pub use throttle::ActionThrottle;
pub use transport::{LeaveReason, LoopbackHub, LoopbackTransport, Transport};
