//! **appsource** - lossless round-tripping of canvas app archives into
//! diffable source trees.
//!
//! An archive is split into per-screen text files plus editor state,
//! rewritten by a symmetric transform pipeline, and verified against a
//! canonical checksum on the way back.

/// Command-line interface with clap integration
pub mod cli;

/// Subcommand runners (anyhow at the edge)
pub mod commands;
pub use commands::{checksum_run, pack_run, unpack_run};

/// Typed library errors
pub mod error;
pub use error::{Result, RoundTripMismatch, SourceError};

/// Zip container and the control JSON stored in it
pub mod archive;

/// Canonical, normalization-aware archive digests
pub mod checksum;

/// Control tree, editor state and paths
pub mod ir;

/// Template catalog with default values
pub mod templates;

/// Themes and default style rules
pub mod theme;

/// Bidirectional tree rewrites between archive and source shape
pub mod transforms;

/// Source text format and the round-trip validating writer
pub mod text;

/// A whole app and its archive conversion
pub mod document;

/// Unpack/pack drivers for on-disk source trees
pub mod source_tree;

/// Best-effort edits replayed during a merge
pub mod merge;

/// Infrastructure - configuration, file I/O, paths and walking
pub mod infra {
    /// Layered configuration with TOML init
    pub mod config;
    pub use config::{Config, load_config};

    /// Relative-path file helpers for source trees
    pub mod io;

    /// Filesystem-safe names for controls and entries
    pub mod path_codec;

    /// Deterministic source-tree walking
    pub mod walk;
    pub use walk::SourceWalker;
}

pub use cli::{AppContext, Cli, Commands};
pub use document::AppDocument;
pub use infra::{Config, load_config};
pub use merge::PendingDelta;
pub use source_tree::{PackReport, UnpackReport, pack, unpack};
