//! Static terrain classification, cached per layer at 8x8-pixel cells.

use std::collections::BTreeMap;

use crate::geom::Point;

/// Terrain classification of one map cell. Closed set; dynamic entities
/// may override the effective value at a point but never extend the set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Ground {
    /// Nothing here, not even a floor: out-of-bounds and unfilled cells.
    Empty,
    #[default]
    Traversable,
    Wall,
    LowWall,
    DeepWater,
    ShallowWater,
    Grass,
    Hole,
    Ice,
    Ladder,
    Prickles,
    Lava,
}

impl Ground {
    pub fn name(self) -> &'static str {
        match self {
            Ground::Empty => "empty",
            Ground::Traversable => "traversable",
            Ground::Wall => "wall",
            Ground::LowWall => "low_wall",
            Ground::DeepWater => "deep_water",
            Ground::ShallowWater => "shallow_water",
            Ground::Grass => "grass",
            Ground::Hole => "hole",
            Ground::Ice => "ice",
            Ground::Ladder => "ladder",
            Ground::Prickles => "prickles",
            Ground::Lava => "lava",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "empty" => Ground::Empty,
            "traversable" => Ground::Traversable,
            "wall" => Ground::Wall,
            "low_wall" => Ground::LowWall,
            "deep_water" => Ground::DeepWater,
            "shallow_water" => Ground::ShallowWater,
            "grass" => Ground::Grass,
            "hole" => Ground::Hole,
            "ice" => Ground::Ice,
            "ladder" => Ground::Ladder,
            "prickles" => Ground::Prickles,
            "lava" => Ground::Lava,
            _ => return None,
        })
    }

    /// Grounds nothing can walk through regardless of entity state.
    pub fn is_wall(self) -> bool {
        matches!(self, Ground::Wall)
    }
}

/// Pixel dimensions and layer range of the loaded map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapGeometry {
    pub width: i32,
    pub height: i32,
    pub min_layer: i32,
    pub max_layer: i32,
}

impl MapGeometry {
    pub fn is_valid_layer(&self, layer: i32) -> bool {
        layer >= self.min_layer && layer <= self.max_layer
    }

    pub fn width8(&self) -> i32 {
        self.width >> 3
    }

    pub fn height8(&self) -> i32 {
        self.height >> 3
    }
}

/// Per-layer array of static ground classifications. Built once at map
/// load; gameplay only reads it. Dynamic overrides are layered on top by
/// the obstacle resolver, never written back here.
#[derive(Debug, Clone)]
pub struct GroundGrid {
    width8: i32,
    height8: i32,
    cells_by_layer: BTreeMap<i32, Vec<Ground>>,
}

impl GroundGrid {
    pub fn new(geometry: MapGeometry) -> Self {
        let width8 = geometry.width8();
        let height8 = geometry.height8();
        let cell_count = (width8 * height8).max(0) as usize;
        let mut cells_by_layer = BTreeMap::new();
        for layer in geometry.min_layer..=geometry.max_layer {
            cells_by_layer.insert(layer, vec![Ground::default(); cell_count]);
        }
        Self {
            width8,
            height8,
            cells_by_layer,
        }
    }

    /// Ground of the cell containing the given pixel, `Empty` when the
    /// point or layer is outside the map.
    pub fn get(&self, layer: i32, point: Point) -> Ground {
        if point.x < 0 || point.y < 0 {
            return Ground::Empty;
        }
        let x8 = point.x >> 3;
        let y8 = point.y >> 3;
        if x8 >= self.width8 || y8 >= self.height8 {
            return Ground::Empty;
        }
        match self.cells_by_layer.get(&layer) {
            Some(cells) => cells[(y8 * self.width8 + x8) as usize],
            None => Ground::Empty,
        }
    }

    /// Writes one cell. Only the map loader calls this.
    pub(crate) fn set_cell(&mut self, layer: i32, x8: i32, y8: i32, ground: Ground) {
        if x8 < 0 || y8 < 0 || x8 >= self.width8 || y8 >= self.height8 {
            return;
        }
        if let Some(cells) = self.cells_by_layer.get_mut(&layer) {
            cells[(y8 * self.width8 + x8) as usize] = ground;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry_64() -> MapGeometry {
        MapGeometry {
            width: 64,
            height: 64,
            min_layer: 0,
            max_layer: 1,
        }
    }

    #[test]
    fn cells_snap_to_eight_pixel_granularity() {
        let mut grid = GroundGrid::new(geometry_64());
        grid.set_cell(0, 1, 0, Ground::Hole);
        // All pixels of cell (1, 0) share the classification.
        assert_eq!(grid.get(0, Point::new(8, 0)), Ground::Hole);
        assert_eq!(grid.get(0, Point::new(15, 7)), Ground::Hole);
        assert_eq!(grid.get(0, Point::new(16, 0)), Ground::Traversable);
        assert_eq!(grid.get(0, Point::new(7, 0)), Ground::Traversable);
    }

    #[test]
    fn out_of_bounds_reads_are_empty() {
        let grid = GroundGrid::new(geometry_64());
        assert_eq!(grid.get(0, Point::new(-1, 0)), Ground::Empty);
        assert_eq!(grid.get(0, Point::new(0, 64)), Ground::Empty);
        assert_eq!(grid.get(5, Point::new(0, 0)), Ground::Empty);
    }

    #[test]
    fn layers_are_independent() {
        let mut grid = GroundGrid::new(geometry_64());
        grid.set_cell(1, 0, 0, Ground::Lava);
        assert_eq!(grid.get(0, Point::new(0, 0)), Ground::Traversable);
        assert_eq!(grid.get(1, Point::new(0, 0)), Ground::Lava);
    }
}
