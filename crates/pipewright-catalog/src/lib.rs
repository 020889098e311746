//! External collaborators of the pipeline graph builder
//!
//! The builder never discovers schemas or stage metadata by itself. This
//! crate defines the contracts it consumes and ships in-memory
//! implementations of them:
//!
//! - [`SchemaProvider`]: resolves column paths to shared schema metadata
//! - [`StageDescriptor`]: declares property slots, outcomes, output streams
//!   and the pure output column function of a stage
//! - [`DescriptorProvider`]: looks descriptors up by name
//!
//! ## Example
//!
//! ```rust,ignore
//! use pipewright_catalog::{builtin, DescriptorProvider, InMemoryCatalog};
//!
//! let descriptors = builtin::registry();
//! let length = descriptors.descriptor(builtin::STRING_LENGTH).unwrap();
//! ```

pub mod builtin;
pub mod descriptor;
pub mod memory;
pub mod registry;
pub mod schema_provider;

pub use descriptor::{
    InputInfo, OutputColumnSpec, OutputContext, OutputFn, OutputRule, OutputStreamSpec, PropertySlot,
    SimpleDescriptor, SlotKind, StageDescriptor,
};
pub use memory::{CatalogFile, InMemoryCatalog};
pub use registry::{DescriptorProvider, DescriptorRegistry};
pub use schema_provider::{ColumnPath, LookupError, ResolvedColumn, SchemaProvider};
