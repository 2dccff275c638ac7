//! # NPC Mind (The Mindstone)
//!
//! The cognitive core of an interactive-fiction character. This crate
//! interfaces with `term_logic`, maintains the character's beliefs, runs
//! interruptible inference to answer questions, reacts to perceived speech
//! acts, and schedules multi-turn dialogue with timeouts and re-asking.
//!
//! ## Core Components
//!
//! - **memory**: short-term and long-term belief stores with provenance and
//!   activation decay
//! - **inference**: interruptible resolution processes, time-sliced by an
//!   anxiety-based scheduler (one step per tick)
//! - **dialogue**: one persistent conversation context per interlocutor
//! - **reaction**: speech-act dispatch from perceived performatives to
//!   intentions or inferences
//! - **intention**: the pending-action queue and its capability handlers
//! - **persist**: XML save/restore of the whole mind
//!
//! ## Design Philosophy
//!
//! - **Tick-driven**: a fixed-order, single-threaded cycle; one resolution
//!   step system-wide per tick bounds the per-frame cost
//! - **Degrade, never halt**: every failure is a diagnostic plus a fallback
//! - **Extensible**: new verbs and inference effects plug in as capability
//!   objects without modifying core logic

pub mod calendar;
pub mod config;
pub mod dialogue;
pub mod inference;
pub mod intention;
pub mod memory;
pub mod mind;
pub mod persist;
pub mod reaction;

pub use config::*;
pub use dialogue::*;
pub use inference::*;
pub use intention::*;
pub use memory::*;
pub use mind::*;
pub use persist::*;
pub use reaction::*;
