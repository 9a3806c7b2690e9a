use crate::storyboard::catalog::{find_shot, ShotDefinition, DEFAULT_SHOT_ID};
use crate::storyboard::error::{Result, StoryboardError};

pub const GRID_CELLS: usize = 9;
pub const GRID_COLUMNS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridState {
    // Unset cells read as DEFAULT_SHOT_ID.
    cells: [Option<&'static str>; GRID_CELLS],
}

impl Default for GridState {
    fn default() -> Self {
        Self::new()
    }
}

impl GridState {
    pub fn new() -> Self {
        let mut grid = GridState {
            cells: [None; GRID_CELLS],
        };
        grid.initialize();
        grid
    }

    pub fn initialize(&mut self) {
        self.cells = [Some(DEFAULT_SHOT_ID); GRID_CELLS];
    }

    pub fn assign(&mut self, cell: usize, shot_id: &str) -> Result<()> {
        check_cell(cell)?;
        let shot = find_shot(shot_id.trim())
            .ok_or_else(|| StoryboardError::UnknownShotId(shot_id.trim().to_string()))?;
        self.cells[cell] = Some(shot.id);
        Ok(())
    }

    pub fn get(&self, cell: usize) -> Result<&'static str> {
        check_cell(cell)?;
        Ok(self.cells[cell].unwrap_or(DEFAULT_SHOT_ID))
    }

    pub fn shot(&self, cell: usize) -> Result<&'static ShotDefinition> {
        let id = self.get(cell)?;
        find_shot(id).ok_or_else(|| StoryboardError::CatalogLookupFailure(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &'static str)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(index, id)| (index, id.unwrap_or(DEFAULT_SHOT_ID)))
    }

    #[cfg(test)]
    pub(crate) fn with_raw_cell(mut self, cell: usize, id: Option<&'static str>) -> Self {
        self.cells[cell] = id;
        self
    }
}

fn check_cell(cell: usize) -> Result<()> {
    if cell < GRID_CELLS {
        Ok(())
    } else {
        Err(StoryboardError::InvalidCellIndex(cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storyboard::catalog::SHOT_TYPES;

    #[test]
    fn new_grid_is_all_default() {
        let grid = GridState::new();
        for cell in 0..GRID_CELLS {
            assert_eq!(grid.get(cell), Ok(DEFAULT_SHOT_ID));
        }
    }

    #[test]
    fn assign_touches_only_the_target_cell() {
        for cell in 0..GRID_CELLS {
            for shot in &SHOT_TYPES {
                let mut grid = GridState::new();
                grid.assign(4, "dutch").unwrap();
                let before = grid.clone();

                grid.assign(cell, shot.id).unwrap();

                assert_eq!(grid.get(cell), Ok(shot.id));
                for other in (0..GRID_CELLS).filter(|other| *other != cell) {
                    assert_eq!(grid.get(other), before.get(other));
                }
            }
        }
    }

    #[test]
    fn rejected_assign_leaves_grid_unchanged() {
        let mut grid = GridState::new();
        grid.assign(2, "wide").unwrap();
        let before = grid.clone();

        assert_eq!(
            grid.assign(9, "wide"),
            Err(StoryboardError::InvalidCellIndex(9))
        );
        assert_eq!(
            grid.assign(0, "tracking"),
            Err(StoryboardError::UnknownShotId("tracking".to_string()))
        );
        assert_eq!(grid, before);
    }

    #[test]
    fn get_rejects_out_of_range_cells() {
        let grid = GridState::new();
        assert_eq!(grid.get(9), Err(StoryboardError::InvalidCellIndex(9)));
        assert_eq!(
            grid.get(usize::MAX),
            Err(StoryboardError::InvalidCellIndex(usize::MAX))
        );
    }

    #[test]
    fn unset_cell_falls_back_to_default() {
        let grid = GridState::new().with_raw_cell(3, None);
        assert_eq!(grid.get(3), Ok(DEFAULT_SHOT_ID));
        assert_eq!(grid.shot(3).map(|shot| shot.id), Ok(DEFAULT_SHOT_ID));
    }

    #[test]
    fn initialize_restores_defaults() {
        let mut grid = GridState::new();
        grid.assign(0, "close_up").unwrap();
        grid.assign(8, "action").unwrap();
        grid.initialize();
        assert!(grid.iter().all(|(_, id)| id == DEFAULT_SHOT_ID));
        assert_eq!(grid.iter().count(), GRID_CELLS);
    }
}
