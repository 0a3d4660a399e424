//! Core types and utilities for SR86x instrument control
//!
//! This crate provides the shared error type and the ONC RPC / VXI-11 wire
//! constants used throughout the workspace.

pub mod constants;
pub mod error;

pub use error::{ReplyError, Sr86xError, Sr86xResult, XdrError};
