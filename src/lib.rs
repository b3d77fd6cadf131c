//! # CSU Replay Library
//!
//! Reconstruct the operational history of the MOSFIRE Configurable Slit Unit
//! from its eavesdrop logs.
//!
//! This library classifies logged property changes, replays them through the
//! CSU status state machine, annotates the resulting intervals with rotator
//! telemetry, and flags moves that ended in a fatal error.

pub mod config;
pub mod error;
pub mod csu;
pub mod telemetry;
pub mod replay;
pub mod table;
pub mod report;
