pub mod gemini;
pub mod media;

pub use gemini::GeminiSceneAnalyzer;
pub use media::load_image_files;
