// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memex Cortex
//!
//! Cognitive memory layer for coding agents. Candidates are scored, compared
//! against what is already known and arbitrated into one of
//! ADD / UPDATE / MERGE / REJECT / DEPRECATE before anything is written.
//!
//! # Architecture
//!
//! - **domain:** memory model, arbitration and search types, store traits, config
//! - **application:** quality gate, risk, similarity, arbitration, storage,
//!   retrieval and evolution, wired together by [`MemoryService`]
//! - **infrastructure:** in-memory graph and vector stores, embedders,
//!   audit sinks and the optional Qdrant backend

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{EvolutionScheduler, IngestContext, IngestRequest, MemoryService};
pub use domain::*;
pub use infrastructure::*;
