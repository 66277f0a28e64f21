//! Everything that touches the output directory.
//!
//! # Submodules
//!
//! - [`store`]: directory layout, idempotent directory creation, atomic writes
//! - [`json`]: the per-keyword `profile.json` manifest
//!
//! # Output Structure
//!
//! ```text
//! root_dir/
//! └── Acme Daily/
//!     ├── header.jpeg
//!     ├── profile.json
//!     ├── First Post/
//!     │   ├── header.jpeg
//!     │   └── article.html
//!     └── Second Post/
//!         ├── header.jpeg
//!         └── article.html
//! ```

pub mod json;
pub mod store;
