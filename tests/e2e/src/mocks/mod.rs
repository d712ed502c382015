mod capabilities;

pub use capabilities::{ConstEmbedder, FailingEmbedder, FailingExtractor, ScriptedExtractor};
