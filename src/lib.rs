// SPDX-License-Identifier: MIT OR Apache-2.0

//! modsim - Learning module similarity library
//!
//! Shared modules for the modsim CLI tool: corpus loading, embedding with an
//! on-disk cache, cosine ranking, and a remote vector-store backend.

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod errors;
pub mod output;
pub mod remote;
pub mod similarity;
