//! Integer pixel geometry shared by the grid, the spatial index and
//! entity bounding boxes.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn translated(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_flat(self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Axis-aligned rectangle in map pixels. Width and height may be zero,
/// in which case the rectangle contains nothing and overlaps nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_point_size(top_left: Point, size: Size) -> Self {
        Self::new(top_left.x, top_left.y, size.width, size.height)
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Whether `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn overlaps(&self, other: &Rectangle) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn at(&self, top_left: Point) -> Self {
        Self::new(top_left.x, top_left.y, self.width, self.height)
    }

    pub fn intersection(&self, other: &Rectangle) -> Rectangle {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return Rectangle::default();
        }
        Rectangle::new(x, y, right - x, bottom - y)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_uses_half_open_edges() {
        let rect = Rectangle::new(8, 8, 16, 16);
        assert!(rect.contains(Point::new(8, 8)));
        assert!(rect.contains(Point::new(23, 23)));
        assert!(!rect.contains(Point::new(24, 8)));
        assert!(!rect.contains(Point::new(8, 24)));
    }

    #[test]
    fn overlap_excludes_touching_edges() {
        let a = Rectangle::new(0, 0, 16, 16);
        let b = Rectangle::new(16, 0, 16, 16);
        let c = Rectangle::new(15, 0, 16, 16);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn empty_rectangle_overlaps_nothing() {
        let empty = Rectangle::new(4, 4, 0, 0);
        let other = Rectangle::new(0, 0, 16, 16);
        assert!(!empty.overlaps(&other));
        assert!(!other.overlaps(&empty));
    }

    #[test]
    fn construction_from_point_and_size() {
        let rect = Rectangle::from_point_size(Point::new(4, 6), Size::new(10, 12));
        assert_eq!(rect, Rectangle::new(4, 6, 10, 12));
        assert!(!rect.size().is_flat());
        assert!(Rectangle::default().size().is_flat());
    }

    #[test]
    fn intersection_clips_to_common_area() {
        let a = Rectangle::new(0, 0, 20, 20);
        let b = Rectangle::new(10, 10, 20, 20);
        assert_eq!(a.intersection(&b), Rectangle::new(10, 10, 10, 10));
        let disjoint = Rectangle::new(100, 100, 4, 4);
        assert!(a.intersection(&disjoint).is_empty());
    }
}
