// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! memex CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Wires the cortex service over snapshot-backed stores and
//!   marshals commands onto it

pub mod commands;
pub mod state;
pub mod wiring;
