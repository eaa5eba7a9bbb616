// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core building blocks shared across the Nightjar agent gateway:
//! message types, the error enum, and the bounded in-memory bus.

pub mod bus;
pub mod error;
pub mod types;

pub use bus::Bus;
pub use error::NightjarError;
pub use types::{parse_origin, Delivery, InboundMessage, OutboundMessage, SYSTEM_CHANNEL};
