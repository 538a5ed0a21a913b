// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: memory model, arbitration and search types, store traits

pub mod arbitration;
pub mod config;
pub mod error;
pub mod events;
pub mod evolution;
pub mod health;
pub mod memory;
pub mod quality;
pub mod relationship;
pub mod repository;
pub mod search;

pub use arbitration::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use evolution::*;
pub use health::*;
pub use memory::*;
pub use quality::*;
pub use relationship::*;
pub use repository::*;
pub use search::*;
