pub mod loader;

pub use loader::GroundTruthSet;
