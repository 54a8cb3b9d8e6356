//! VSSP v1.0 frame reassembly core.
//!
//! A headset sender splits every video frame into UDP fragments, each carrying
//! a fixed 24-byte header. This crate holds the I/O-free half of the relay:
//!
//! - [`header`]: fragment header parsing and encoding
//! - [`table`]: per-frame buffers keyed by `(frame_id, eye)` with duplicate
//!   suppression, completion detection and age/capacity eviction
//! - [`policy`]: exact or threshold completion
//! - [`assembler`]: ordered concatenation of fragment payloads
//! - [`envelope`]: the framing sent to viewers for each completed frame
//! - [`fragment`]: the sender side, used by the test sender and tests
//!
//! The daemon in `vssp_relay` drives these from a single event loop.

pub mod assembler;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod header;
pub mod policy;
pub mod stats;
pub mod table;

pub use config::{AssemblyConfig, AssemblyOverrides, CompletionMode};
pub use error::{FragmentError, PolicyError, ProtocolError};
pub use frame::{AssembledFrame, FrameBuffer, FrameKey, FrameState};
pub use header::{FragmentHeader, FLAG_LAST_FRAGMENT, HEADER_LEN, MAGIC};
pub use policy::CompletionPolicy;
pub use stats::TableStats;
pub use table::{AssemblyTable, InsertOutcome, SweepReport};
