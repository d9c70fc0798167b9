//! Device links for the acquisition system.
//!
//! This crate provides the drivers the centre-up coordinator talks through.
//! Each driver is feature-gated for optional compilation.
//!
//! # Features
//!
//! - `tcc` - Telescope Control Computer line-protocol link (default)

#[cfg(feature = "tcc")]
pub mod tcc;
