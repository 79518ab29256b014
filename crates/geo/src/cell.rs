use crate::RasterSize;

/// Represents a pixel in the raster using row, col coordinates
/// The coordinates can be negative or beyond the raster size when a location falls outside of the raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    pub row: i32,
    pub col: i32,
}

impl Cell {
    pub const fn from_row_col(row: i32, col: i32) -> Self {
        Cell { row, col }
    }

    pub const fn invalid() -> Self {
        Cell { row: -1, col: -1 }
    }

    pub const fn is_valid(&self) -> bool {
        self.row >= 0 && self.col >= 0
    }

    /// The cell lies within a raster of the given size
    pub fn is_within(&self, size: RasterSize) -> bool {
        self.is_valid() && (self.row as usize) < size.rows && (self.col as usize) < size.cols
    }

    /// Clamp the cell into the provided row and column ranges (both inclusive)
    pub fn clamped(&self, row_range: (i32, i32), col_range: (i32, i32)) -> Cell {
        Cell::from_row_col(
            self.row.clamp(row_range.0, row_range.1),
            self.col.clamp(col_range.0, col_range.1),
        )
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.row.cmp(&other.row).then(self.col.cmp(&other.col))
    }
}
