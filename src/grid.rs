// 🗺️ Grid - occupancy view of the lot
//
// The grid is never a source of truth: the allocation engine rebuilds it from
// the open occupancy records before every decision.

use crate::space::Space;
use serde::{Deserialize, Serialize};

/// Fixed lot dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotLayout {
    pub rows: usize,
    pub columns: usize,
}

impl LotLayout {
    pub fn new(rows: usize, columns: usize) -> Self {
        LotLayout { rows, columns }
    }

    pub fn capacity(&self) -> usize {
        self.rows * self.columns
    }

    pub fn contains(&self, space: Space) -> bool {
        space.row < self.rows && space.column < self.columns
    }
}

impl Default for LotLayout {
    fn default() -> Self {
        LotLayout::new(4, 5)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    layout: LotLayout,
    /// Row-major cells, `rows * columns` long
    cells: Vec<Option<String>>,
}

impl Grid {
    /// All-empty grid
    pub fn new(layout: LotLayout) -> Self {
        Grid {
            layout,
            cells: vec![None; layout.capacity()],
        }
    }

    pub fn layout(&self) -> LotLayout {
        self.layout
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|cell| *cell = None);
    }

    fn index(&self, space: Space) -> Option<usize> {
        if self.layout.contains(space) {
            Some(space.row * self.layout.columns + space.column)
        } else {
            None
        }
    }

    /// Plate parked at `space`, if any
    pub fn get(&self, space: Space) -> Option<&str> {
        self.index(space)
            .and_then(|i| self.cells[i].as_deref())
    }

    pub fn is_occupied(&self, space: Space) -> bool {
        self.get(space).is_some()
    }

    /// Put a plate in an empty, in-bounds space. Returns false otherwise.
    pub fn place(&mut self, space: Space, plate: &str) -> bool {
        match self.index(space) {
            Some(i) if self.cells[i].is_none() => {
                self.cells[i] = Some(plate.to_string());
                true
            }
            _ => false,
        }
    }

    /// First empty space scanning row by row, lowest column first
    pub fn first_free(&self) -> Option<Space> {
        self.cells
            .iter()
            .position(Option::is_none)
            .map(|i| Space::new(i / self.layout.columns, i % self.layout.columns))
    }

    pub fn is_full(&self) -> bool {
        self.first_free().is_none()
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    pub fn free_count(&self) -> usize {
        self.layout.capacity() - self.occupied_count()
    }

    /// Where a plate is parked, if it is on the grid
    pub fn position_of(&self, plate: &str) -> Option<Space> {
        self.cells
            .iter()
            .position(|cell| cell.as_deref() == Some(plate))
            .map(|i| Space::new(i / self.layout.columns, i % self.layout.columns))
    }

    /// Cells grouped by row, for rendering
    pub fn rows(&self) -> impl Iterator<Item = &[Option<String>]> {
        // chunks() panics on 0; an empty layout simply has no rows
        self.cells.chunks(self.layout.columns.max(1))
    }
}
