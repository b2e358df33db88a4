//! # geoscan-types
//!
//! Plain value types for the geoscan R-tree index:
//!
//! - **Bounding boxes**: `BoundingBox2D`, a single-precision axis-aligned box
//! - **Index entries**: `Entry`, a bounding box paired with the id of the row it came from
//!
//! All types are serializable with Serde. Conversions from the `geo` crate's
//! double-precision geometries round outward, so the single-precision box
//! always encloses the exact extent.
//!
//! ## Examples
//!
//! ```rust
//! use geoscan_types::bbox::BoundingBox2D;
//! use geoscan_types::entry::Entry;
//!
//! let bbox = BoundingBox2D::new(-74.0, 40.7, -73.9, 40.8);
//! let entry = Entry::new(bbox, 42);
//! assert_eq!(entry.row_id, 42);
//! ```

pub mod bbox;
pub mod entry;

pub use bbox::BoundingBox2D;
pub use entry::{Entry, RowId};
