pub mod file;

pub use file::{AudioClip, AudioError};
