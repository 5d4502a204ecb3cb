use super::oe_model::Geometry;

pub const MIN_WIDTH: f32 = 50.0;
pub const MIN_HEIGHT: f32 = 20.0;

/// An alignment line in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Guide {
    Vertical(f32),
    Horizontal(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapMode {
    Move,
    Resize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapResult {
    pub geometry: Geometry,
    pub guides: Vec<Guide>,
}

/// Where one axis ended up after snapping, plus the target it landed on.
struct AxisSnap { start: f32, len: f32, target: f32 }

/// Start, center and end of a span.
fn span_points(start: f32, len: f32) -> [f32; 3] { [start, start + len / 2.0, start + len] }

fn snap_axis(start: f32, len: f32, targets: &[f32], mode: SnapMode, threshold: f32, min_len: f32) -> Option<AxisSnap> {
    for &target in targets {
        match mode {
            SnapMode::Move => {
                let hit: Option<f32> = span_points(start, len).into_iter().find(|p| (p - target).abs() <= threshold);
                if let Some(point) = hit {
                    return Some(AxisSnap { start: start + (target - point), len, target });
                }
            }
            SnapMode::Resize => {
                let end: f32 = start + len;
                if (end - target).abs() <= threshold && target - start >= min_len {
                    return Some(AxisSnap { start, len: target - start, target });
                }
            }
        }
    }
    None
}

/// Adjusts `proposed` so a point of it lands on the first listed target
/// within `threshold`. Canvas targets are tried before sibling targets, and
/// the two axes snap independently.
pub fn snap(proposed: Geometry, siblings: &[Geometry], canvas: (f32, f32), mode: SnapMode, threshold: f32) -> SnapResult {
    let mut xs: Vec<f32> = span_points(0.0, canvas.0).to_vec();
    let mut ys: Vec<f32> = span_points(0.0, canvas.1).to_vec();
    for s in siblings {
        xs.extend(span_points(s.x, s.width));
        ys.extend(span_points(s.y, s.height));
    }

    let mut geometry: Geometry = proposed;
    let mut guides: Vec<Guide> = Vec::new();
    if let Some(a) = snap_axis(proposed.x, proposed.width, &xs, mode, threshold, MIN_WIDTH) {
        geometry.x = a.start;
        geometry.width = a.len;
        guides.push(Guide::Vertical(a.target));
    }
    if let Some(a) = snap_axis(proposed.y, proposed.height, &ys, mode, threshold, MIN_HEIGHT) {
        geometry.y = a.start;
        geometry.height = a.len;
        guides.push(Guide::Horizontal(a.target));
    }
    SnapResult { geometry, guides }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom(x: f32, y: f32, width: f32, height: f32) -> Geometry { Geometry { x, y, width, height } }

    const CANVAS: (f32, f32) = (1000.0, 800.0);

    #[test]
    fn drag_lands_on_sibling_edge() {
        let sibling: Geometry = geom(100.0, 500.0, 120.0, 40.0);
        let out: SnapResult = snap(geom(103.0, 300.0, 217.0, 33.0), &[sibling], CANVAS, SnapMode::Move, 5.0);
        assert_eq!(out.geometry.x, 100.0);
        assert_eq!(out.geometry.y, 300.0);
        assert_eq!(out.geometry.width, 217.0);
        assert_eq!(out.guides, vec![Guide::Vertical(100.0)]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let sibling: Geometry = geom(100.0, 500.0, 120.0, 40.0);
        let at_edge: SnapResult = snap(geom(105.0, 300.0, 217.0, 33.0), &[sibling], CANVAS, SnapMode::Move, 5.0);
        assert_eq!(at_edge.geometry.x, 100.0);
        let past: SnapResult = snap(geom(105.5, 300.0, 217.0, 33.0), &[sibling], CANVAS, SnapMode::Move, 5.0);
        assert_eq!(past.geometry.x, 105.5);
        assert!(past.guides.is_empty());
    }

    #[test]
    fn canvas_targets_win_ties() {
        // canvas center x = 500; sibling start at 497 is also in range of the box center
        let sibling: Geometry = geom(497.0, 600.0, 60.0, 20.0);
        let out: SnapResult = snap(geom(400.0, 300.0, 198.0, 33.0), &[sibling], CANVAS, SnapMode::Move, 5.0);
        assert_eq!(out.geometry.x, 401.0);
        assert_eq!(out.guides, vec![Guide::Vertical(500.0)]);
    }

    #[test]
    fn axes_snap_independently() {
        let out: SnapResult = snap(geom(997.0 - 300.0, 3.0, 300.0, 50.0), &[], CANVAS, SnapMode::Move, 5.0);
        assert_eq!(out.geometry.x, 700.0);
        assert_eq!(out.geometry.y, 0.0);
        assert_eq!(out.guides, vec![Guide::Vertical(1000.0), Guide::Horizontal(0.0)]);
    }

    #[test]
    fn resize_moves_only_the_far_edge() {
        let sibling: Geometry = geom(10.0, 10.0, 290.0, 50.0);
        let out: SnapResult = snap(geom(100.0, 200.0, 197.0, 80.0), &[sibling], CANVAS, SnapMode::Resize, 5.0);
        assert_eq!(out.geometry.x, 100.0);
        assert_eq!(out.geometry.width, 200.0);
        assert_eq!(out.guides, vec![Guide::Vertical(300.0)]);

        // start edge near a target does not snap while resizing
        let out: SnapResult = snap(geom(302.0, 200.0, 120.0, 80.0), &[sibling], CANVAS, SnapMode::Resize, 5.0);
        assert_eq!(out.geometry, geom(302.0, 200.0, 120.0, 80.0));
    }

    #[test]
    fn resize_snap_respects_minimum() {
        // snapping the end to x=100 would leave width 48
        let sibling: Geometry = geom(100.0, 600.0, 100.0, 40.0);
        let out: SnapResult = snap(geom(52.0, 300.0, 50.0, 40.0), &[sibling], CANVAS, SnapMode::Resize, 5.0);
        assert_eq!(out.geometry.width, 50.0);
        assert!(out.guides.is_empty());
    }
}
