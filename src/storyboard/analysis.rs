use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::llm::media::ImageInput;
use crate::storyboard::catalog::Language;
use crate::storyboard::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneAnalysis {
    pub cn: String,
    pub en: String,
}

impl SceneAnalysis {
    pub fn text(&self, language: Language) -> &str {
        match language {
            Language::Cn => &self.cn,
            Language::En => &self.en,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cn.is_empty() || self.en.is_empty()
    }
}

// Must fail with EmptyInput on an empty slice before any network call.
pub trait SceneAnalyzer {
    fn analyze(&self, images: &[ImageInput]) -> impl Future<Output = Result<SceneAnalysis>> + Send;
}
