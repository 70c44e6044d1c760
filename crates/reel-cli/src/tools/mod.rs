//! The concrete operations behind the agent's three tools

mod generate;
mod inspect;
mod run;

pub use generate::{ModelGenerator, SourceStore};
pub use inspect::RendererInspector;
pub use run::{Quality, Renderer, RendererExecutor};
