// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::matrix::Shape;

/// Symbolic KV backend error, wrapped into [`Error::Kv`].
#[derive(Debug)]
pub enum KvError {
    /// General, backend-specific failure
    General(String),

    /// The requested key does not exist
    MissingKey(i64),

    /// The key already exists (on `insert`)
    DuplicateKey(i64),

    /// A partial read fell outside the bounds of the record
    OutOfRange {
        /// key of the record
        key: i64,
        /// requested offset
        offset: i64,
        /// requested length
        len: i64,
        /// actual record size
        record_size: i64,
    },

    /// The backend does not implement this operation
    Unsupported(&'static str),

    /// The backend ran out of storage capacity
    Capacity(String),

    /// A transient failure occurred; the caller should retry the whole
    /// transaction
    RetryTransaction,

    /// Block/record (de)compression failed
    CompressionFailed(String),
}

impl std::fmt::Display for KvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General(msg) => write!(f, "KV_GENERAL: {msg}"),
            Self::MissingKey(key) => write!(f, "KV_MISSING_KEY: {key}"),
            Self::DuplicateKey(key) => write!(f, "KV_DUPLICATE_KEY: {key}"),
            Self::OutOfRange {
                key,
                offset,
                len,
                record_size,
            } => write!(
                f,
                "KV_OUT_OF_RANGE: key={key} offset={offset} len={len} record_size={record_size}"
            ),
            Self::Unsupported(op) => write!(f, "KV_UNSUPPORTED: {op}"),
            Self::Capacity(msg) => write!(f, "KV_CAPACITY: {msg}"),
            Self::RetryTransaction => write!(f, "KV_RETRY_TRANSACTION"),
            Self::CompressionFailed(msg) => write!(f, "COMPRESSION_FAILED: {msg}"),
        }
    }
}

impl std::error::Error for KvError {}

/// The top-level error type for every fallible operation in this crate.
///
/// One flat enum, one variant per failure family, a hand-written
/// [`Display`](std::fmt::Display), and `From` impls that let `?` cross
/// module boundaries without a dedicated error crate.
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// A KV backend operation failed; see [`KvError`] for the precise kind
    Kv(KvError),

    /// A set-algebra operation (union/intersection/difference/equals/subset)
    /// was attempted between two sets with different comparator or
    /// hash/eq identity
    SetAlgebraMismatch,

    /// `peek` was called on an empty hash set
    SetEmpty,

    /// An ordered-set iterator was asked to start at an element that isn't
    /// in the set
    SortedSetIterFromMissing,

    /// A gene-tree leaf had no entry in the leaf-to-species map during
    /// reconciliation
    UnmappedLeaf(String),

    /// An operation required a strictly-binary tree but the input wasn't
    NotBinary,

    /// Matrix or vector operands had incompatible shapes
    ShapeMismatch {
        /// shape of the left-hand operand
        lhs: Shape,
        /// shape of the right-hand operand
        rhs: Shape,
    },

    /// A KV backend configuration document was malformed or missing a
    /// required attribute
    ConfigInvalid(String),

    /// A newick string did not match the accepted grammar
    NewickParse(String),

    /// A random-range request had `min > max`
    RandomBadRange {
        /// requested lower bound
        min: i64,
        /// requested upper bound
        max: i64,
    },

    /// A connectivity operation's precondition was violated: the node or
    /// edge it names doesn't exist, or (for `addNode`) already does
    ConnectivityPrecondition(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "PhylocoreError::Io({e})"),
            Self::Kv(e) => write!(f, "PhylocoreError::Kv({e})"),
            Self::SetAlgebraMismatch => write!(f, "SET_ALGEBRA_MISMATCH"),
            Self::SetEmpty => write!(f, "SET_EMPTY"),
            Self::SortedSetIterFromMissing => write!(f, "SORTED_SET_ITER_FROM_MISSING"),
            Self::UnmappedLeaf(label) => write!(f, "PHYLO_UNMAPPED_LEAF: {label}"),
            Self::NotBinary => write!(f, "PHYLO_NOT_BINARY"),
            Self::ShapeMismatch { lhs, rhs } => {
                write!(f, "MATRIX_SHAPE_MISMATCH: {lhs:?} vs {rhs:?}")
            }
            Self::ConfigInvalid(msg) => write!(f, "CONFIG_INVALID: {msg}"),
            Self::NewickParse(msg) => write!(f, "NEWICK_PARSE: {msg}"),
            Self::RandomBadRange { min, max } => {
                write!(f, "RANDOM_BAD_RANGE: min={min} max={max}")
            }
            Self::ConnectivityPrecondition(msg) => {
                write!(f, "CONNECTIVITY_PRECONDITION: {msg}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Kv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<KvError> for Error {
    fn from(value: KvError) -> Self {
        Self::Kv(value)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
