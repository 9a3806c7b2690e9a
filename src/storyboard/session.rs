use tracing::{info, warn};

use crate::llm::media::{ImageInput, ImagePreview};
use crate::storyboard::analysis::{SceneAnalysis, SceneAnalyzer};
use crate::storyboard::catalog::{Language, SHOT_TYPES};
use crate::storyboard::composer::compose;
use crate::storyboard::error::{Result, StoryboardError};
use crate::storyboard::grid::{GridState, GRID_CELLS, GRID_COLUMNS};

#[derive(Debug)]
pub enum AnalysisStart {
    NoImages,
    Busy,
    Started(AnalysisTicket),
}

#[derive(Debug)]
pub struct AnalysisTicket {
    epoch: u64,
    images: Vec<ImageInput>,
}

impl AnalysisTicket {
    pub fn images(&self) -> &[ImageInput] {
        &self.images
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Applied,
    Failed(StoryboardError),
    /// The session was reset while the call was in flight.
    Discarded,
    NoImages,
    Busy,
}

#[derive(Debug, Default)]
pub struct SessionController {
    images: Vec<ImageInput>,
    previews: Vec<ImagePreview>,
    scene: SceneAnalysis,
    grid: GridState,
    selected_cell: Option<usize>,
    language: Language,
    busy: bool,
    epoch: u64,
    copied: bool,
}

impl SessionController {
    pub fn new(language: Language) -> Self {
        SessionController {
            language,
            ..Default::default()
        }
    }

    pub fn images(&self) -> &[ImageInput] {
        &self.images
    }

    pub fn previews(&self) -> &[ImagePreview] {
        &self.previews
    }

    pub fn scene(&self) -> &SceneAnalysis {
        &self.scene
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn selected_cell(&self) -> Option<usize> {
        self.selected_cell
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_copied(&self) -> bool {
        self.copied
    }

    pub fn needs_analysis_hint(&self) -> bool {
        self.scene.en.is_empty()
    }

    pub fn select_images(&mut self, images: Vec<ImageInput>) {
        self.previews = images
            .iter()
            .enumerate()
            .map(|(index, image)| ImagePreview::from_input(index, image))
            .collect();
        self.images = images;
        self.copied = false;
        info!("Selected {} reference image(s)", self.images.len());
    }

    pub fn set_scene(&mut self, scene: SceneAnalysis) {
        self.scene = scene;
        self.copied = false;
    }

    pub fn begin_analysis(&mut self) -> AnalysisStart {
        if self.images.is_empty() {
            return AnalysisStart::NoImages;
        }
        if self.busy {
            warn!("Ignoring analysis request while another analysis is running");
            return AnalysisStart::Busy;
        }
        self.busy = true;
        info!("Starting scene analysis for {} image(s)", self.images.len());
        AnalysisStart::Started(AnalysisTicket {
            epoch: self.epoch,
            images: self.images.clone(),
        })
    }

    pub fn finish_analysis(
        &mut self,
        ticket: AnalysisTicket,
        result: Result<SceneAnalysis>,
    ) -> AnalysisOutcome {
        self.busy = false;

        if ticket.epoch != self.epoch {
            info!("Discarding analysis result from before the last reset");
            return AnalysisOutcome::Discarded;
        }

        match result {
            Ok(scene) => {
                self.scene = scene;
                self.copied = false;
                info!("Scene analysis applied");
                AnalysisOutcome::Applied
            }
            Err(err) => {
                warn!("Scene analysis failed: {err}");
                AnalysisOutcome::Failed(err)
            }
        }
    }

    pub async fn start_analysis<A: SceneAnalyzer>(&mut self, analyzer: &A) -> AnalysisOutcome {
        match self.begin_analysis() {
            AnalysisStart::NoImages => AnalysisOutcome::NoImages,
            AnalysisStart::Busy => AnalysisOutcome::Busy,
            AnalysisStart::Started(ticket) => {
                let result = analyzer.analyze(ticket.images()).await;
                self.finish_analysis(ticket, result)
            }
        }
    }

    pub fn select_cell(&mut self, index: usize) -> Result<()> {
        if index >= GRID_CELLS {
            return Err(StoryboardError::InvalidCellIndex(index));
        }
        self.selected_cell = Some(index);
        Ok(())
    }

    /// Assigns `shot_id` to the selected cell. Returns `Ok(false)` when no
    /// cell is selected.
    pub fn choose_shot(&mut self, shot_id: &str) -> Result<bool> {
        let Some(cell) = self.selected_cell else {
            return Ok(false);
        };
        self.grid.assign(cell, shot_id)?;
        self.copied = false;
        Ok(true)
    }

    pub fn set_language(&mut self, language: Language) {
        if self.language != language {
            self.language = language;
            self.copied = false;
        }
    }

    pub fn reset(&mut self) {
        self.images.clear();
        self.previews.clear();
        self.scene = SceneAnalysis::default();
        self.selected_cell = None;
        self.grid.initialize();
        self.copied = false;
        self.epoch += 1;
        info!("Session reset");
    }

    pub fn prompt(&self) -> Result<String> {
        compose(self.language, &self.scene, &self.grid)
    }

    pub fn copy_prompt(&mut self) -> Result<String> {
        let prompt = self.prompt()?;
        self.mark_copied();
        Ok(prompt)
    }

    pub fn mark_copied(&mut self) {
        self.copied = true;
    }

    pub fn render_grid(&self) -> Result<String> {
        let mut rows = Vec::with_capacity(GRID_CELLS / GRID_COLUMNS);
        let mut cells = Vec::with_capacity(GRID_COLUMNS);
        for index in 0..GRID_CELLS {
            let shot = self.grid.shot(index)?;
            let marker = if self.selected_cell == Some(index) {
                '>'
            } else {
                ' '
            };
            cells.push(format!(
                "{marker}{:02} {}",
                index + 1,
                shot.label(self.language)
            ));
            if cells.len() == GRID_COLUMNS {
                rows.push(cells.join(" | "));
                cells.clear();
            }
        }
        Ok(rows.join("\n"))
    }

    pub fn render_palette(&self) -> Result<String> {
        let Some(cell) = self.selected_cell else {
            return Ok("Select a grid cell above to change its shot type.".to_string());
        };
        let current = self.grid.get(cell)?;
        let mut lines = vec![format!("Editing Shot {:02}", cell + 1)];
        for shot in &SHOT_TYPES {
            let mark = if shot.id == current { 'x' } else { ' ' };
            lines.push(format!(
                "  [{mark}] {:<16} {}",
                shot.id,
                shot.label(self.language)
            ));
        }
        Ok(lines.join("\n"))
    }
}
