use crate::storyboard::catalog::{find_shot, Language};
use crate::storyboard::error::{Result, StoryboardError};
use crate::storyboard::grid::GridState;
use crate::storyboard::SceneAnalysis;

/// Builds the final image-generator prompt: one scene line followed by one
/// line per grid cell in ascending order, each terminated by `\n`.
pub fn compose(language: Language, scene: &SceneAnalysis, grid: &GridState) -> Result<String> {
    let template = language.template();
    let description = match scene.text(language) {
        "" => language.scene_placeholder(),
        text => text,
    };

    let mut prompt = format!("{}{}{}\n", template.prefix, description, template.suffix);

    for (index, shot_id) in grid.iter() {
        let shot = find_shot(shot_id)
            .ok_or_else(|| StoryboardError::CatalogLookupFailure(shot_id.to_string()))?;
        prompt.push_str(&format!(
            "{}{:02}: {}\n",
            template.shot_prefix,
            index + 1,
            shot.value(language)
        ));
    }

    Ok(prompt)
}
