//! Quadtree over dynamic entity bounding boxes.
//!
//! The index never owns entities; it stores ids plus the placement the
//! registry last pushed to it. Every query result comes back sorted by
//! (layer, z) ascending, which is the draw order and the collision
//! tie-break order for the whole engine.

use crate::entities::EntityId;
use crate::geom::Rectangle;

/// Elements held by one node before it subdivides.
const NODE_CAPACITY: usize = 8;
/// Nodes smaller than this never subdivide, bounding tree depth.
const MIN_NODE_SIZE: i32 = 16;
/// The root area extends past the map bounds so that entities walking
/// slightly off-map stay indexed.
const ROOT_MARGIN: i32 = 64;

/// Placement of an entity as known to the index. The registry passes the
/// same value to `remove` that it passed to `insert`, so lookups never
/// have to scan the whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialPlacement {
    pub id: EntityId,
    pub bounding_box: Rectangle,
    pub layer: i32,
    pub z: i32,
}

impl SpatialPlacement {
    fn order_key(&self) -> (i32, i32) {
        (self.layer, self.z)
    }
}

#[derive(Debug)]
struct QuadNode {
    area: Rectangle,
    items: Vec<SpatialPlacement>,
    children: Option<Box<[QuadNode; 4]>>,
}

impl QuadNode {
    fn new(area: Rectangle) -> Self {
        Self {
            area,
            items: Vec::new(),
            children: None,
        }
    }

    fn can_subdivide(&self) -> bool {
        self.area.width / 2 >= MIN_NODE_SIZE && self.area.height / 2 >= MIN_NODE_SIZE
    }

    fn child_areas(&self) -> [Rectangle; 4] {
        let half_w = self.area.width / 2;
        let half_h = self.area.height / 2;
        let right_w = self.area.width - half_w;
        let bottom_h = self.area.height - half_h;
        [
            Rectangle::new(self.area.x, self.area.y, half_w, half_h),
            Rectangle::new(self.area.x + half_w, self.area.y, right_w, half_h),
            Rectangle::new(self.area.x, self.area.y + half_h, half_w, bottom_h),
            Rectangle::new(self.area.x + half_w, self.area.y + half_h, right_w, bottom_h),
        ]
    }

    fn insert(&mut self, placement: SpatialPlacement) {
        if self.children.is_none() && self.items.len() >= NODE_CAPACITY && self.can_subdivide() {
            self.subdivide();
        }
        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                if child.area.contains_rect(&placement.bounding_box) {
                    child.insert(placement);
                    return;
                }
            }
        }
        // Straddles the split (or the node is a leaf): stays here.
        self.items.push(placement);
    }

    fn subdivide(&mut self) {
        let areas = self.child_areas();
        let mut children = Box::new([
            QuadNode::new(areas[0]),
            QuadNode::new(areas[1]),
            QuadNode::new(areas[2]),
            QuadNode::new(areas[3]),
        ]);
        let mut kept = Vec::new();
        for item in self.items.drain(..) {
            let mut placed = false;
            for child in children.iter_mut() {
                if child.area.contains_rect(&item.bounding_box) {
                    child.insert(item);
                    placed = true;
                    break;
                }
            }
            if !placed {
                kept.push(item);
            }
        }
        self.items = kept;
        self.children = Some(children);
    }

    fn remove(&mut self, placement: &SpatialPlacement) -> bool {
        if let Some(position) = self.items.iter().position(|item| item.id == placement.id) {
            self.items.swap_remove(position);
            return true;
        }
        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                if child.area.contains_rect(&placement.bounding_box) {
                    return child.remove(placement);
                }
            }
            // The stored box may predate a subdivision; fall back to a
            // full scan of overlapping children.
            for child in children.iter_mut() {
                if child.area.overlaps(&placement.bounding_box) && child.remove(placement) {
                    return true;
                }
            }
        }
        false
    }

    fn collect_overlapping(&self, rect: &Rectangle, out: &mut Vec<SpatialPlacement>) {
        for item in &self.items {
            if item.bounding_box.overlaps(rect) {
                out.push(*item);
            }
        }
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                if child.area.overlaps(rect) {
                    child.collect_overlapping(rect, out);
                }
            }
        }
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        match self.children.as_ref() {
            Some(children) => 1 + children.iter().map(QuadNode::depth).max().unwrap_or(0),
            None => 1,
        }
    }
}

#[derive(Debug)]
pub struct SpatialIndex {
    root: QuadNode,
    item_count: usize,
}

impl SpatialIndex {
    /// Builds an empty index covering the map area plus a margin.
    pub fn new(map_width: i32, map_height: i32) -> Self {
        let area = Rectangle::new(
            -ROOT_MARGIN,
            -ROOT_MARGIN,
            map_width + 2 * ROOT_MARGIN,
            map_height + 2 * ROOT_MARGIN,
        );
        Self {
            root: QuadNode::new(area),
            item_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.item_count
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    pub fn insert(&mut self, placement: SpatialPlacement) {
        self.root.insert(placement);
        self.item_count += 1;
    }

    pub fn remove(&mut self, placement: &SpatialPlacement) -> bool {
        let removed = self.root.remove(placement);
        if removed {
            self.item_count -= 1;
        } else {
            tracing::warn!(id = ?placement.id, "spatial index asked to remove an unknown entity");
        }
        removed
    }

    /// Repositions an entity after its box, layer or z changed.
    /// Remove + reinsert; the tree is never rebalanced in place.
    pub fn notify_placement_changed(&mut self, old: &SpatialPlacement, new: SpatialPlacement) {
        if self.root.remove(old) {
            self.item_count -= 1;
        }
        self.insert(new);
    }

    /// All placements whose box overlaps `rect`, sorted by (layer, z).
    /// A rectangle fully outside the indexed area yields an empty vec.
    pub fn query_rect(&self, rect: &Rectangle) -> Vec<SpatialPlacement> {
        let mut out = Vec::new();
        if rect.is_empty() || !self.root.area.overlaps(rect) {
            return out;
        }
        self.root.collect_overlapping(rect, &mut out);
        out.sort_by_key(SpatialPlacement::order_key);
        out
    }

    #[cfg(test)]
    fn tree_depth(&self) -> usize {
        self.root.depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(raw_id: u64, x: i32, y: i32, layer: i32, z: i32) -> SpatialPlacement {
        SpatialPlacement {
            id: EntityId::from_raw(raw_id),
            bounding_box: Rectangle::new(x, y, 16, 16),
            layer,
            z,
        }
    }

    fn ids(placements: &[SpatialPlacement]) -> Vec<u64> {
        placements.iter().map(|p| p.id.raw()).collect()
    }

    #[test]
    fn query_returns_exactly_the_overlapping_set() {
        let mut index = SpatialIndex::new(256, 256);
        for i in 0..10 {
            index.insert(placement(i, (i as i32) * 20, 0, 0, i as i32));
        }
        let hits = index.query_rect(&Rectangle::new(0, 0, 50, 16));
        assert_eq!(ids(&hits), vec![0, 1, 2]);
    }

    #[test]
    fn results_are_sorted_by_layer_then_z() {
        let mut index = SpatialIndex::new(256, 256);
        index.insert(placement(1, 0, 0, 1, 0));
        index.insert(placement(2, 4, 4, 0, 5));
        index.insert(placement(3, 8, 8, 0, 2));
        index.insert(placement(4, 2, 2, 1, -3));
        let hits = index.query_rect(&Rectangle::new(0, 0, 64, 64));
        assert_eq!(ids(&hits), vec![3, 2, 4, 1]);
    }

    #[test]
    fn subdivision_keeps_straddlers_at_the_parent() {
        let mut index = SpatialIndex::new(256, 256);
        // Fill one quadrant past capacity so the root splits.
        for i in 0..12 {
            index.insert(placement(i, (i as i32 % 4) * 18, (i as i32 / 4) * 18, 0, i as i32));
        }
        assert!(index.tree_depth() > 1);
        // An entity across the middle of the map straddles every split.
        index.insert(SpatialPlacement {
            id: EntityId::from_raw(100),
            bounding_box: Rectangle::new(120, 120, 32, 32),
            layer: 0,
            z: 100,
        });
        let hits = index.query_rect(&Rectangle::new(110, 110, 60, 60));
        assert_eq!(ids(&hits), vec![100]);
        assert_eq!(index.len(), 13);
    }

    #[test]
    fn move_repositions_without_duplicating() {
        let mut index = SpatialIndex::new(256, 256);
        let old = placement(7, 0, 0, 0, 1);
        index.insert(old);
        let new = placement(7, 200, 200, 0, 1);
        index.notify_placement_changed(&old, new);
        assert!(index.query_rect(&Rectangle::new(0, 0, 32, 32)).is_empty());
        let hits = index.query_rect(&Rectangle::new(192, 192, 64, 64));
        assert_eq!(ids(&hits), vec![7]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_after_subdivision_finds_descendants() {
        let mut index = SpatialIndex::new(256, 256);
        let mut placements = Vec::new();
        for i in 0..24 {
            let p = placement(i, (i as i32 % 6) * 20, (i as i32 / 6) * 20, 0, i as i32);
            index.insert(p);
            placements.push(p);
        }
        for p in &placements {
            assert!(index.remove(p), "failed to remove {:?}", p.id);
        }
        assert!(index.is_empty());
    }

    #[test]
    fn off_map_query_is_empty_not_an_error() {
        let mut index = SpatialIndex::new(256, 256);
        index.insert(placement(1, 0, 0, 0, 0));
        assert!(index.query_rect(&Rectangle::new(-4000, -4000, 100, 100)).is_empty());
        assert!(index.query_rect(&Rectangle::new(0, 0, 0, 0)).is_empty());
    }
}
