//! # Catalog Diff
//!
//! Semantic comparison of two compiled configuration catalogs.
//!
//! A catalog is the fully-resolved set of resources compiled for one host.
//! Comparing an old ("from") and new ("to") catalog yields an ordered list
//! of [`DiffEntry`] values: resources added or removed, scalar attributes
//! changed, and collection-valued attributes changed in place.
//!
//! ## Pipeline
//!
//! 1. **Normalize** each catalog ([`normalize()`]): drop exported resources,
//!    identify files by path, strip ordering-only parameters, sort unordered
//!    sets, split source locations into a side table.
//! 2. **Structural diff** of resources present on both sides ([`structural`]).
//! 3. **Reclassify** insertions/removals inside collections as a single
//!    nested change carrying the whole old and new collection.
//! 4. **Ignore rules** ([`IgnoreRule`]) and **post-filters** ([`Filter`]).
//!
//! ## Example
//!
//! ```ignore
//! use catalog_diff::{Catalog, Differ, IgnoreRule};
//!
//! let from = Catalog::from_path("old.json".as_ref())?;
//! let to = Catalog::from_path("new.json".as_ref())?;
//!
//! let differ = Differ::new()
//!     .with_ignore(["File[/var/lib/puppet/*]".parse::<IgnoreRule>()?])
//!     .with_filters(&["AbsentFile"])?;
//!
//! for entry in differ.diff(&from, &to)? {
//!     println!("{} {}", entry.kind().symbol(), entry.key());
//! }
//! ```

pub mod engine;
pub mod entry;
pub mod error;
pub mod filters;
pub mod key;
pub mod model;
pub mod normalize;
pub mod rules;
pub mod structural;
pub mod validate;

// Re-export main types at crate root
pub use engine::{DiffSummary, Differ, diff, rules_from_ignore_tags};
pub use entry::{ChangeKind, DiffEntry};
pub use error::{Error, ErrorCategory, Result};
pub use filters::{Filter, FilterContext};
pub use key::{Key, SEPARATOR};
pub use model::{BuildStatus, Catalog, Location, Resource};
pub use normalize::{NormalizedCatalog, normalize};
pub use rules::{AttrSpec, IgnoreRule, Pattern, is_ignored};
pub use validate::{ValidationOptions, validate};
