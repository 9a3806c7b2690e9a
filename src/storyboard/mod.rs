pub mod analysis;
pub mod catalog;
pub mod composer;
pub mod error;
pub mod grid;
pub mod session;

pub use analysis::{SceneAnalysis, SceneAnalyzer};
pub use catalog::{Language, SHOT_TYPES};
pub use session::{AnalysisOutcome, AnalysisStart, AnalysisTicket, SessionController};
