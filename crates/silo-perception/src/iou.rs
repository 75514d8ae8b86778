//! Intersection-over-Union of axis-aligned pixel boxes.

use silo_types::BoundingBoxXyxy;

/// Overlap region of two boxes, or `None` when they are disjoint.
///
/// Boxes that only share an edge yield a zero-area intersection.
pub fn intersection(a: &BoundingBoxXyxy, b: &BoundingBoxXyxy) -> Option<BoundingBoxXyxy> {
    let x_left = a.x_min.max(b.x_min);
    let y_top = a.y_min.max(b.y_min);
    let x_right = a.x_max.min(b.x_max);
    let y_bottom = a.y_max.min(b.y_max);

    if x_right < x_left || y_bottom < y_top {
        return None;
    }
    Some(BoundingBoxXyxy::new(x_left, y_top, x_right, y_bottom))
}

/// IoU of two boxes; exactly `0.0` when they do not overlap.
pub fn iou(a: &BoundingBoxXyxy, b: &BoundingBoxXyxy) -> f64 {
    let Some(inter) = intersection(a, b) else {
        return 0.0;
    };
    let inter_area = inter.area();
    let union = a.area() + b.area() - inter_area;
    if union > 0.0 { inter_area / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(x0: f64, y0: f64, x1: f64, y1: f64) -> BoundingBoxXyxy {
        BoundingBoxXyxy::new(x0, y0, x1, y1)
    }

    #[test]
    fn partial_overlap() {
        let v = iou(&b(0.0, 0.0, 10.0, 10.0), &b(5.0, 5.0, 15.0, 15.0));
        assert!((v - 25.0 / 175.0).abs() < 1e-12, "iou = {v}");
    }

    #[test]
    fn disjoint_boxes_are_exactly_zero() {
        let a = b(0.0, 0.0, 5.0, 5.0);
        let c = b(10.0, 10.0, 15.0, 15.0);
        assert_eq!(iou(&a, &c), 0.0);
        assert!(intersection(&a, &c).is_none());
    }

    #[test]
    fn identical_boxes() {
        let a = b(3.0, 4.0, 30.0, 40.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn touching_edges_have_empty_intersection() {
        let a = b(0.0, 0.0, 5.0, 5.0);
        let c = b(5.0, 0.0, 10.0, 5.0);
        let inter = intersection(&a, &c).expect("edges touch");
        assert_eq!(inter.area(), 0.0);
        assert_eq!(iou(&a, &c), 0.0);
    }

    #[test]
    fn degenerate_boxes_do_not_divide_by_zero() {
        let p = b(1.0, 1.0, 1.0, 1.0);
        assert_eq!(iou(&p, &p), 0.0);
    }

    #[test]
    fn contained_box() {
        let outer = b(0.0, 0.0, 10.0, 10.0);
        let inner = b(2.0, 2.0, 7.0, 7.0);
        assert!((iou(&outer, &inner) - 0.25).abs() < 1e-12);
    }
}
