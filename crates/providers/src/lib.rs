//! The Axon generation pipeline.
//!
//! A request flows through four layers, leaves first:
//!
//! - [`classify`] maps raw provider errors onto a fixed taxonomy (C1)
//! - [`executor::LlmExecutor`] builds a transient provider per attempt and
//!   performs exactly one call (C2)
//! - [`streaming::StreamRelay`] multiplexes streamed chunks into lifecycle
//!   events and the user callback (C3)
//! - [`coordinator::GenerationCoordinator`] composes retry on the same
//!   model with fallback across a ranked model list (C4)

pub mod catalog;
pub mod classify;
pub mod coordinator;
pub mod executor;
pub mod mock;
pub mod registry;
pub mod streaming;
pub mod traits;

pub use catalog::{ModelCatalog, StaticModelCatalog};
pub use classify::classify;
pub use coordinator::{GenerationCoordinator, GenerationOutcome, ModelSelection};
pub use executor::{CredentialPool, LlmExecutor};
pub use registry::ProviderRegistry;
pub use traits::{GenerateOptions, Provider, ProviderFactory, ResolvedCredentials};
