//! Controller subsystem for mouse and keyboard remapping
//!
//! Turns raw pointer and key events into a virtual gamepad:
//!
//! 1. [`state`] - Logical pad state, buttons and d-pad directions
//! 2. [`mapping`] - Default classification of buttons and keys
//! 3. [`keys`] - Held-key table
//! 4. [`pulse`] - Deferred release of the wheel-driven button
//! 5. [`sink`] - Output boundary and the in-process virtual pad
//! 6. [`engine`] - Event handling, mode machine and output commits
//! 7. [`handle`] - Unified API and lifecycle management
//!
//! # Architecture
//!
//! ```text
//! RawInputEvent ──► Engine ──► ControllerSink ──► PadReport
//!                  (State)     (on change only)
//! ```

pub mod engine;
pub mod handle;
pub mod keys;
pub mod mapping;
pub mod pulse;
pub mod sink;
pub mod state;
