//! DevMesh Canonical Layer - Deterministic Log Canonicalization
//!
//! This crate turns raw journal messages into canonical *template text*: the
//! volatile-token-free skeleton that the rest of the pipeline deduplicates,
//! embeds, and searches. It also computes the two 128-bit fingerprints the
//! stores key on: the event-level `log_hash` and the template-level
//! `template_hash`.
//!
//! # Core Guarantee
//!
//! > **Same message + same `CanonicalizeConfig` → identical canonical text,
//! > forever.**
//!
//! The crate is **pure** and **side-effect free**:
//! - No I/O operations
//! - No network calls
//! - No dependence on wall-clock time, locale, or hardware
//!
//! # Pipeline Position
//!
//! ```text
//! Raw Event ──▶ Ingest ──▶ Canonical ──▶ Template Store ──▶ Embed ──▶ Search
//!                              ↑
//!                           (this crate)
//! ```
//!
//! # Rule Ordering
//!
//! Rules run in a fixed order, specific before generic:
//!
//! 1. Structured-prefix projections (firewall blocks, auth/session lines,
//!    batch-progress lines, cron command lines, access-log timestamps)
//! 2. Generic token substitutions (`<TS>`, `<UUID>`, `<MAC>`, `<IPV6>`,
//!    `<IPV4>`, `<HEX>`, `pid=<PID>`, `<DUR>`, `<N>`)
//! 3. Home directory collapse (`/home/alice/x` → `/home/<USER>/x`)
//! 4. Control character removal and whitespace collapse
//!
//! Any change to the rules or their order requires a new config `version`;
//! templates produced under older versions stay valid and searchable.
//!
//! # Quick Start
//!
//! ```rust
//! use canonical::{canonicalize, CanonicalizeConfig};
//!
//! let cfg = CanonicalizeConfig::default();
//! let text = canonicalize("worker pid=4711 finished batch 3 of 96", &cfg).unwrap();
//! assert_eq!(text, "worker pid=<PID> finished batch <N> of <N>");
//! ```

mod config;
mod error;
mod hash;
mod rules;
mod whitespace;

pub use crate::config::CanonicalizeConfig;
pub use crate::error::CanonicalError;
pub use crate::hash::{log_hash, template_hash};
pub use crate::rules::canonicalize;
pub use crate::whitespace::collapse_whitespace;
