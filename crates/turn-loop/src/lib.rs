//! turn-loop - Runtime for one conversational turn
//!
//! Drives a turn end to end: resolve the next state, run its actions,
//! drain every emitted layer into ordered frames and forward them to the
//! transport. Deferred layers pull their payloads from the
//! `ResponseMultiplexer`, which correlates asynchronously published
//! inference results by channel id.

pub mod config;
pub mod drain;
pub mod error;
pub mod executor;
pub mod multiplexer;
pub mod runner;

pub use config::TurnLoopConfig;
pub use drain::{FrameStream, LayerDrainer, TurnData};
pub use error::{Result, TurnError};
pub use executor::{EventExecutor, ExecutionOutput};
pub use multiplexer::{ChannelWaiter, CorrelationError, ResponseMultiplexer};
pub use runner::{FsmRunner, TurnEvent, TurnPhase, TurnReport};
