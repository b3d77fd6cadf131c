//! # CSU Log Replay Module
//!
//! Reconstruction of CSU operational history from eavesdrop log lines.
//!
//! This module handles:
//! - Property-change vocabulary and signal types
//! - Classifying raw log lines into signals
//! - Replaying signals through the status state machine
//! - The interval records produced by the replay
//! - Flagging moves that ended in a fatal error

pub mod protocol;
pub mod classifier;
pub mod interval;
pub mod tracker;
pub mod failure;
