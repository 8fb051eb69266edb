pub mod chapter;
pub mod scene;
pub mod tts;
pub mod workflow;
