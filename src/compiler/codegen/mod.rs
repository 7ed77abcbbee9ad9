//! # Native Code Generation
//!
//! The code generation core: per-module compilation units over the Cranelift
//! backend, cross-module import machinery, dependency-ordered lowering and
//! parallel object emission.
//!
//! The pieces fit together like this:
//! - [`session`]: the per-compilation backend session owning settings,
//!   registry, struct list and caches
//! - [`module_registry`]: the module compilation units and their backend
//!   modules
//! - [`symbols`]: symbol tables, struct layouts and the lookup caches
//! - [`dependencies`]: `use`-graph records and the depth-first scheduler
//! - [`imports`]: external declarations and qualified name resolution
//! - [`lowering`]: the create/link/lower pass driver
//! - [`expressions`]: statement and expression lowering inside function
//!   bodies
//! - [`object_emitter`]: the parallel object file emitter
//! - [`string_escapes`]: string literal escape decoding and encoding

pub mod dependencies;
pub mod expressions;
pub mod imports;
pub mod lowering;
pub mod module_registry;
pub mod object_emitter;
pub mod session;
pub mod string_escapes;
pub mod symbols;
