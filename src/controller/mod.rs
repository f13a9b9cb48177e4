//! Pad protocol engine
//!
//! Implements the per-tick pipeline that turns shift register output into
//! pad reports:
//!
//! 1. [`sampler`] - Latches the pads and clocks out a 24-cycle snapshot
//! 2. [`adapter_probe`] - Looks for the four-player adapter signature
//! 3. [`decoder`] - Maps snapshot bits to buttons, axes and pad kind
//! 4. [`pad_orchestrator`] - Runs the above for every active slot and reports
//! 5. [`poll_scheduler`] - Starts and stops the 10 ms tick as devices open and close
//! 6. [`controller_handle`] - Startup, registration and teardown
//!
//! # Architecture
//!
//! ```text
//! PollScheduler ──tick──► Sampler ──► AdapterProbe ──► Decoder ──► InputSink
//!                         (GPIO)      (Snapshot)       (PadState)  (per slot)
//! ```
//!
//! Everything inside a tick runs on the single poll task.

pub mod adapter_probe;
pub mod controller_handle;
pub mod decoder;
pub mod pad_orchestrator;
pub mod pad_state;
pub mod poll_scheduler;
pub mod sampler;

pub use controller_handle::{ControllerHandle, DriverError, PadDriver};
pub use pad_orchestrator::{PadOrchestrator, PollMode};
pub use pad_state::{Axis, Button, PadKind, PadState, Snapshot};
pub use poll_scheduler::{PollError, PollScheduler, POLL_PERIOD};
