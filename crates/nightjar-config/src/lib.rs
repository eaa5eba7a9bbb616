// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Nightjar agent gateway.
//!
//! Configuration is a single JSON document (`config.json`) in the Nightjar
//! state directory. [`model`] defines the serde structs with defaults,
//! [`loader`] reads/writes the document atomically, [`routing`] resolves
//! the effective LLM endpoint from a routed model string, and [`paths`]
//! locates the state directory and its children.

pub mod loader;
pub mod model;
pub mod paths;
pub mod routing;

pub use loader::{load, save};
pub use model::Config;
