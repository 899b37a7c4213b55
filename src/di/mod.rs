//! Dependency injection graph.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     provide / provide_value / include(map) → graph.rs (keyed initializers)
//!     bind::<dyn Trait>() → implicit keys with a distance
//!     conflicts → policy.rs
//!
//! Resolution:
//!     resolve::<T>() → resolver.rs (cycle-tracking chain)
//!     → initializer.rs (memoized shared future per provider)
//!     → Arc<T>
//! ```
//!
//! # Design Decisions
//! - Values are created lazily, at most once per provider
//! - Ambiguity is recorded at registration and reported at resolution
//! - Under concurrent startup, consumers of unknown keys wait until a
//!   provider arrives or the startup phase is closed

pub mod error;
pub mod graph;
pub mod initializer;
pub mod key;
pub mod maps;
pub mod policy;
pub mod resolver;

pub use error::DependencyError;
pub use graph::{DependencyGraph, DependencyGraphBuilder, DependencyStartup, Provision};
pub use initializer::{downcast, instance, Instance};
pub use key::{DependencyKey, Qualifier};
pub use maps::{ConfigurationDependencyMap, DependencyMap, MapDependencies};
pub use policy::{ConflictPolicy, ConflictResolution, DefaultConflictPolicy, IgnoreConflicts, InitializerKind};
pub use resolver::DependencyResolver;
