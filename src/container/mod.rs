// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Generic container primitives: a fixed-length
//! ordered [`Tuple`], a growable [`Sequence`], a comparator-keyed
//! [`SortedSet`], and [`HashMap`]/[`HashSet`] built on `rustc-hash`.

mod hash_map;
mod hash_set;
mod sequence;
mod sorted_set;
mod tuple;

pub use hash_map::HashMap;
pub use hash_set::HashSet;
pub use sequence::{Cursor, Sequence};
pub use sorted_set::{Comparator, SortedSet};
pub use tuple::{Scalar, Tuple};
