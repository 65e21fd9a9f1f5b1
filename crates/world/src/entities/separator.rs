//! Separators split the map into regions the camera and region queries
//! must not cross.

use crate::geom::{Point, Rectangle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparatorOrientation {
    /// Thin along x: separates a left region from a right region.
    Vertical,
    /// Thin along y: separates a top region from a bottom region.
    Horizontal,
}

/// A separator has no state of its own; its geometry is the owning
/// entity's bounding box, thin along the axis it separates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Separator;

impl Separator {
    pub fn orientation(bounding_box: &Rectangle) -> SeparatorOrientation {
        if bounding_box.width < bounding_box.height {
            SeparatorOrientation::Vertical
        } else {
            SeparatorOrientation::Horizontal
        }
    }

    /// The boundary line, at the middle of the thin dimension.
    pub fn split_line(bounding_box: &Rectangle) -> i32 {
        match Self::orientation(bounding_box) {
            SeparatorOrientation::Vertical => bounding_box.x + bounding_box.width / 2,
            SeparatorOrientation::Horizontal => bounding_box.y + bounding_box.height / 2,
        }
    }

    /// Whether `point` lies on the low-coordinate side of the split.
    /// The convention is half-open: a point exactly on the line belongs
    /// to the high side, and both sides of the query use the same rule.
    pub fn point_on_low_side(bounding_box: &Rectangle, point: Point) -> bool {
        let split = Self::split_line(bounding_box);
        match Self::orientation(bounding_box) {
            SeparatorOrientation::Vertical => point.x < split,
            SeparatorOrientation::Horizontal => point.y < split,
        }
    }

    /// Clips `region` to the side of this separator that contains
    /// `point`. Returns `region` unchanged when the separator does not
    /// cut through it.
    pub fn clip_region(bounding_box: &Rectangle, point: Point, region: Rectangle) -> Rectangle {
        if !bounding_box.overlaps(&region) {
            return region;
        }
        let split = Self::split_line(bounding_box);
        let low_side = Self::point_on_low_side(bounding_box, point);
        match Self::orientation(bounding_box) {
            SeparatorOrientation::Vertical => {
                if low_side {
                    if split < region.right() {
                        Rectangle::new(region.x, region.y, split - region.x, region.height)
                    } else {
                        region
                    }
                } else if split > region.x {
                    Rectangle::new(split, region.y, region.right() - split, region.height)
                } else {
                    region
                }
            }
            SeparatorOrientation::Horizontal => {
                if low_side {
                    if split < region.bottom() {
                        Rectangle::new(region.x, region.y, region.width, split - region.y)
                    } else {
                        region
                    }
                } else if split > region.y {
                    Rectangle::new(region.x, split, region.width, region.bottom() - split)
                } else {
                    region
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thin_dimension_decides_orientation() {
        let vertical = Rectangle::new(128, 0, 16, 256);
        let horizontal = Rectangle::new(0, 128, 256, 16);
        assert_eq!(Separator::orientation(&vertical), SeparatorOrientation::Vertical);
        assert_eq!(
            Separator::orientation(&horizontal),
            SeparatorOrientation::Horizontal
        );
    }

    #[test]
    fn boundary_point_belongs_to_the_high_side() {
        let vertical = Rectangle::new(128, 0, 16, 256);
        let split = Separator::split_line(&vertical);
        assert!(Separator::point_on_low_side(&vertical, Point::new(split - 1, 10)));
        assert!(!Separator::point_on_low_side(&vertical, Point::new(split, 10)));
    }

    #[test]
    fn clip_keeps_the_side_containing_the_point() {
        let vertical = Rectangle::new(120, 0, 16, 256);
        let region = Rectangle::new(0, 0, 256, 256);
        let split = Separator::split_line(&vertical);

        let left = Separator::clip_region(&vertical, Point::new(10, 10), region);
        assert_eq!(left, Rectangle::new(0, 0, split, 256));

        let right = Separator::clip_region(&vertical, Point::new(200, 10), region);
        assert_eq!(right, Rectangle::new(split, 0, 256 - split, 256));
    }

    #[test]
    fn separator_outside_region_does_not_clip() {
        let vertical = Rectangle::new(500, 0, 16, 256);
        let region = Rectangle::new(0, 0, 256, 256);
        let clipped = Separator::clip_region(&vertical, Point::new(10, 10), region);
        assert_eq!(clipped, region);
    }
}
