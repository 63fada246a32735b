// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Generic systems primitives for a comparative-genomics pipeline.
//!
//! This crate bundles the reusable, domain-agnostic core that higher-level
//! alignment, phylogeny and whole-genome-comparison tools build on:
//!
//! - [`container`]: polymorphic in-memory containers (sequence, ordered set,
//!   hash map/set, fixed tuple) with consistent ownership and iterator
//!   semantics.
//! - [`kv`]: a pluggable key -> value persistence layer with one abstract
//!   contract ([`kv::KvStore`]) and several concrete backends, fronted by an
//!   optional size-bounded LRU byte cache.
//! - [`connectivity`]: a dynamic-connectivity engine over an undirected
//!   multigraph, backed by Euler-tour treaps, plus a disjoint-set companion.
//! - [`phylogeny`]: distance-based phylogenetic inference (neighbor-joining,
//!   species-guided neighbor-joining, bootstrap scoring, gene/species tree
//!   reconciliation).
//! - [`pool`]: a bounded worker pool for CPU-bound unit-of-work dispatch.
//! - [`newick`], [`matrix`], [`random`]: supporting data models these
//!   components are built from.
//!
//! This crate provides primitives, not a full pipeline: FASTA/CIGAR parsing,
//! pairwise-alignment record types, and curve fitting are left to callers
//! (see `DESIGN.md` for the full list of out-of-scope collaborators).

pub mod connectivity;
pub mod container;
pub mod error;
pub mod kv;
pub mod matrix;
pub mod newick;
pub mod phylogeny;
pub mod pool;
pub mod random;

pub use error::{Error, Result};
