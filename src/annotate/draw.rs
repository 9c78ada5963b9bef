//! Pose overlay drawing on raw RGB frames.

use crate::detect::{KeypointLabel, Pose};
use crate::frame::{FrameShape, CHANNELS};

pub type Color = [u8; 3];

pub const KEYPOINT_COLOR: Color = [0, 0, 255];
pub const EDGE_COLOR: Color = [255, 0, 0];
pub const KEYPOINT_RADIUS: i32 = 5;
pub const STROKE: i32 = 2;

/// Keypoints below this score are neither drawn nor joined.
pub const DEFAULT_KEYPOINT_THRESHOLD: f32 = 0.2;

use KeypointLabel::*;

/// Skeleton edges joined between drawn keypoints.
pub const EDGES: [(KeypointLabel, KeypointLabel); 19] = [
    (Nose, LeftEye),
    (Nose, RightEye),
    (Nose, LeftEar),
    (Nose, RightEar),
    (LeftEar, LeftEye),
    (RightEar, RightEye),
    (LeftEye, RightEye),
    (LeftShoulder, RightShoulder),
    (LeftShoulder, LeftElbow),
    (LeftShoulder, LeftHip),
    (RightShoulder, RightElbow),
    (RightShoulder, RightHip),
    (LeftElbow, LeftWrist),
    (RightElbow, RightWrist),
    (LeftHip, RightHip),
    (LeftHip, LeftKnee),
    (RightHip, RightKnee),
    (LeftKnee, LeftAnkle),
    (RightKnee, RightAnkle),
];

/// Scaled keypoints are clamped to this many pixels either side of the origin
/// so later integer arithmetic cannot overflow.
const COORD_LIMIT: f32 = (1 << 20) as f32;

/// Mutable view of an `H×W×3` pixel buffer.
pub struct Canvas<'a> {
    shape: FrameShape,
    pixels: &'a mut [u8],
}

impl<'a> Canvas<'a> {
    /// `None` when the buffer length does not match `shape`.
    pub fn new(shape: FrameShape, pixels: &'a mut [u8]) -> Option<Self> {
        (pixels.len() == shape.byte_len()).then_some(Self { shape, pixels })
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        let idx = self.index(x, y)?;
        Some([self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]])
    }

    pub fn put_pixel(&mut self, x: i32, y: i32, color: Color) {
        if let Some(idx) = self.index(x, y) {
            self.pixels[idx..idx + CHANNELS].copy_from_slice(&color);
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.shape.width || y as usize >= self.shape.height {
            return None;
        }
        Some((y as usize * self.shape.width + x as usize) * CHANNELS)
    }

    /// Square brush centred on (x, y).
    fn stamp(&mut self, x: i32, y: i32, thickness: i32, color: Color) {
        let lo = -(thickness - 1) / 2;
        let hi = thickness / 2;
        for dy in lo..=hi {
            for dx in lo..=hi {
                self.put_pixel(x + dx, y + dy, color);
            }
        }
    }

    /// Circle outline of the given stroke thickness.
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Color, thickness: i32) {
        let inner = (radius - thickness / 2).max(0) as f32 - 0.5;
        let outer = (radius + (thickness - 1) / 2) as f32 + 0.5;
        let reach = radius + thickness;
        let (width, height) = (self.shape.width as i64, self.shape.height as i64);
        let (cx64, cy64, reach64) = (cx as i64, cy as i64, reach as i64);
        if cx64 + reach64 < 0 || cy64 + reach64 < 0 || cx64 - reach64 >= width || cy64 - reach64 >= height {
            return;
        }
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let d = ((dx * dx + dy * dy) as f32).sqrt();
                if d >= inner && d <= outer {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Bresenham line, stamped with a square brush. The segment is first
    /// clipped to the canvas grown by the brush size.
    pub fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), color: Color, thickness: i32) {
        let margin = thickness.max(1) as f64;
        let bounds = (
            -margin,
            -margin,
            self.shape.width as f64 - 1.0 + margin,
            self.shape.height as f64 - 1.0 + margin,
        );
        let Some(((mut x, mut y), (x1, y1))) = clip_segment(from, to, bounds) else {
            return;
        };
        let dx = (x1 - x).abs();
        let dy = -(y1 - y).abs();
        let sx = if x < x1 { 1 } else { -1 };
        let sy = if y < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.stamp(x, y, thickness, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

/// Liang-Barsky clipping of a segment against `(xmin, ymin, xmax, ymax)`.
fn clip_segment(
    from: (i32, i32),
    to: (i32, i32),
    (xmin, ymin, xmax, ymax): (f64, f64, f64, f64),
) -> Option<((i32, i32), (i32, i32))> {
    let (x0, y0) = (from.0 as f64, from.1 as f64);
    let (dx, dy) = (to.0 as f64 - x0, to.1 as f64 - y0);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, x0 - xmin), (dx, xmax - x0), (-dy, y0 - ymin), (dy, ymax - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    let at = |t: f64| ((x0 + t * dx).round() as i32, (y0 + t * dy).round() as i32);
    Some((at(t0), at(t1)))
}

fn to_pixel(coord: f32, scale: f32) -> i32 {
    (coord * scale).round().clamp(-COORD_LIMIT, COORD_LIMIT) as i32
}

/// Draw one pose. Keypoints are given in `tensor` coordinates and scaled to
/// the canvas. Returns the number of keypoints drawn.
pub fn draw_pose(canvas: &mut Canvas<'_>, pose: &Pose, tensor: FrameShape, threshold: f32) -> usize {
    let frame = canvas.shape();
    let scale_y = frame.height as f32 / tensor.height.max(1) as f32;
    let scale_x = frame.width as f32 / tensor.width.max(1) as f32;

    let mut drawn: [Option<(i32, i32)>; KeypointLabel::COUNT] = [None; KeypointLabel::COUNT];
    for kp in &pose.keypoints {
        if kp.score < threshold || !kp.x.is_finite() || !kp.y.is_finite() {
            continue;
        }
        let point = (to_pixel(kp.x, scale_x), to_pixel(kp.y, scale_y));
        canvas.draw_circle(point.0, point.1, KEYPOINT_RADIUS, KEYPOINT_COLOR, STROKE);
        drawn[kp.label as usize] = Some(point);
    }

    for (a, b) in EDGES {
        if let (Some(from), Some(to)) = (drawn[a as usize], drawn[b as usize]) {
            canvas.draw_line(from, to, EDGE_COLOR, STROKE);
        }
    }
    drawn.iter().filter(|p| p.is_some()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Keypoint;

    fn blank(shape: FrameShape) -> Vec<u8> {
        vec![0u8; shape.byte_len()]
    }

    #[test]
    fn canvas_rejects_mismatched_buffer() {
        let mut pixels = vec![0u8; 10];
        assert!(Canvas::new(FrameShape::new(2, 2), &mut pixels).is_none());
    }

    #[test]
    fn out_of_bounds_writes_are_clipped() {
        let shape = FrameShape::new(8, 8);
        let mut pixels = blank(shape);
        let mut canvas = Canvas::new(shape, &mut pixels).unwrap();
        canvas.draw_circle(0, 0, 5, KEYPOINT_COLOR, 2);
        canvas.draw_line((-10, -10), (20, 20), EDGE_COLOR, 2);
        assert_eq!(canvas.pixel(4, 4), Some(EDGE_COLOR));
        assert_eq!(canvas.pixel(8, 0), None);
    }

    #[test]
    fn line_covers_both_endpoints() {
        let shape = FrameShape::new(20, 20);
        let mut pixels = blank(shape);
        let mut canvas = Canvas::new(shape, &mut pixels).unwrap();
        canvas.draw_line((2, 3), (15, 11), EDGE_COLOR, 1);
        assert_eq!(canvas.pixel(2, 3), Some(EDGE_COLOR));
        assert_eq!(canvas.pixel(15, 11), Some(EDGE_COLOR));
        assert_eq!(canvas.pixel(15, 3), Some([0, 0, 0]));
    }

    #[test]
    fn low_score_keypoints_are_skipped_and_unjoined() {
        let shape = FrameShape::new(40, 40);
        let mut pixels = blank(shape);
        let mut canvas = Canvas::new(shape, &mut pixels).unwrap();
        let pose = Pose {
            score: 0.5,
            keypoints: vec![
                Keypoint { label: LeftShoulder, y: 10.0, x: 10.0, score: 0.9 },
                Keypoint { label: RightShoulder, y: 10.0, x: 30.0, score: 0.1 },
            ],
        };
        assert_eq!(draw_pose(&mut canvas, &pose, shape, DEFAULT_KEYPOINT_THRESHOLD), 1);
        // Ring around the drawn keypoint, nothing along the would-be edge.
        assert_eq!(canvas.pixel(15, 10), Some(KEYPOINT_COLOR));
        assert_eq!(canvas.pixel(20, 10), Some([0, 0, 0]));
    }

    #[test]
    fn keypoints_scale_from_tensor_to_frame() {
        let frame = FrameShape::new(100, 200);
        let tensor = FrameShape::new(50, 50);
        let mut pixels = blank(frame);
        let mut canvas = Canvas::new(frame, &mut pixels).unwrap();
        let pose = Pose {
            score: 0.9,
            keypoints: vec![
                Keypoint { label: LeftHip, y: 25.0, x: 10.0, score: 0.9 },
                Keypoint { label: RightHip, y: 25.0, x: 40.0, score: 0.9 },
            ],
        };
        assert_eq!(draw_pose(&mut canvas, &pose, tensor, DEFAULT_KEYPOINT_THRESHOLD), 2);
        // Hips land at x=40 and x=160 on row 50, joined by an edge.
        assert_eq!(canvas.pixel(100, 50), Some(EDGE_COLOR));
        assert_eq!(canvas.pixel(100, 20), Some([0, 0, 0]));
    }

    #[test]
    fn skeleton_has_nineteen_distinct_edges() {
        let unordered = |(a, b): (KeypointLabel, KeypointLabel)| if a <= b { (a, b) } else { (b, a) };
        let actual: std::collections::BTreeSet<_> = EDGES.into_iter().map(unordered).collect();
        let expected: std::collections::BTreeSet<_> = [
            (Nose, LeftEye),
            (Nose, RightEye),
            (Nose, LeftEar),
            (Nose, RightEar),
            (LeftEar, LeftEye),
            (RightEar, RightEye),
            (LeftEye, RightEye),
            (LeftShoulder, RightShoulder),
            (LeftShoulder, LeftElbow),
            (LeftShoulder, LeftHip),
            (RightShoulder, RightElbow),
            (RightShoulder, RightHip),
            (LeftElbow, LeftWrist),
            (RightElbow, RightWrist),
            (LeftHip, RightHip),
            (LeftHip, LeftKnee),
            (RightHip, RightKnee),
            (LeftKnee, LeftAnkle),
            (RightKnee, RightAnkle),
        ]
        .into_iter()
        .map(unordered)
        .collect();
        assert_eq!(actual.len(), 19);
        assert_eq!(actual, expected);
    }

    #[test]
    fn eyes_are_joined() {
        let shape = FrameShape::new(40, 60);
        let mut pixels = blank(shape);
        let mut canvas = Canvas::new(shape, &mut pixels).unwrap();
        let pose = Pose {
            score: 0.9,
            keypoints: vec![
                Keypoint { label: LeftEye, y: 20.0, x: 10.0, score: 0.9 },
                Keypoint { label: RightEye, y: 20.0, x: 50.0, score: 0.9 },
            ],
        };
        assert_eq!(draw_pose(&mut canvas, &pose, shape, DEFAULT_KEYPOINT_THRESHOLD), 2);
        assert_eq!(canvas.pixel(30, 20), Some(EDGE_COLOR));
    }

    #[test]
    fn extreme_coordinates_do_not_panic() {
        let shape = FrameShape::new(20, 40);
        let mut pixels = blank(shape);
        let mut canvas = Canvas::new(shape, &mut pixels).unwrap();
        let pose = Pose {
            score: 0.9,
            keypoints: vec![
                Keypoint { label: LeftHip, y: 10.0, x: f32::NEG_INFINITY, score: 0.9 },
                Keypoint { label: RightHip, y: 10.0, x: f32::INFINITY, score: 0.9 },
                Keypoint { label: LeftKnee, y: f32::NAN, x: 5.0, score: 0.9 },
                Keypoint { label: LeftShoulder, y: 5.0, x: -1e30, score: 0.9 },
                Keypoint { label: RightShoulder, y: 5.0, x: 1e30, score: 0.9 },
            ],
        };
        // Non-finite keypoints are dropped; huge finite ones are clamped.
        assert_eq!(draw_pose(&mut canvas, &pose, shape, DEFAULT_KEYPOINT_THRESHOLD), 2);
        assert_eq!(canvas.pixel(20, 5), Some(EDGE_COLOR));
        assert_eq!(canvas.pixel(20, 10), Some([0, 0, 0]));

        canvas.draw_circle(i32::MAX, i32::MIN, KEYPOINT_RADIUS, KEYPOINT_COLOR, STROKE);
        canvas.draw_line((i32::MIN, i32::MIN), (i32::MAX, i32::MAX), EDGE_COLOR, STROKE);
        canvas.draw_line((i32::MIN, 15), (i32::MAX, 15), EDGE_COLOR, STROKE);
        assert_eq!(canvas.pixel(0, 15), Some(EDGE_COLOR));
        assert_eq!(canvas.pixel(39, 15), Some(EDGE_COLOR));
    }
}
