//! Model preparation: bake LoRA adapters into a standalone model file with an external tool,
//! and cache the result under a deterministic key so the slow merge runs once per combination.
//!
//! Flow: `MergePipeline::merge` -> validate inputs -> `MergeKey` -> `AdapterMergeCache` lookup
//! -> (miss) `ToolLocator` -> external tool (or base-model copy when the tool is absent).

// region:    --- Modules

mod adapter_spec;
mod config;
mod merge_cache;
mod merge_key;
mod pipeline;
mod progress;
mod tool_locator;

pub use adapter_spec::*;
pub use config::*;
pub use merge_cache::*;
pub use merge_key::*;
pub use pipeline::*;
pub use progress::*;
pub use tool_locator::*;

// endregion: --- Modules
