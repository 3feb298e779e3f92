// raster drawing primitives used by the tile renderer
use bevy::math::DVec2;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{Blend, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

/// Everything the tile renderer needs from a raster: polygon fills and thick lines, both
/// alpha-blended over what is already there. Coordinates are in pixels, y pointing down.
pub trait Canvas {
    fn fill_polygon(&mut self, polygon: &[DVec2], color: Rgba<u8>);

    fn draw_line(&mut self, from: DVec2, to: DVec2, width: f64, color: Rgba<u8>);
}

// imageproc rejects rings whose last point repeats the first
fn to_points(polygon: &[DVec2]) -> Vec<Point<i32>> {
    let mut points: Vec<Point<i32>> = polygon
        .iter()
        .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect();
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

impl Canvas for Blend<RgbaImage> {
    fn fill_polygon(&mut self, polygon: &[DVec2], color: Rgba<u8>) {
        if color[3] == 0 {
            return;
        }

        let points = to_points(polygon);
        match points.as_slice() {
            [] => {}
            // collapsed to a point or a sliver at this resolution
            [only] => draw_line_segment_mut(self, (only.x as f32, only.y as f32), (only.x as f32, only.y as f32), color),
            [a, b] => draw_line_segment_mut(self, (a.x as f32, a.y as f32), (b.x as f32, b.y as f32), color),
            _ => draw_polygon_mut(self, &points, color),
        }
    }

    // thick lines are drawn as quads around the segment
    fn draw_line(&mut self, from: DVec2, to: DVec2, width: f64, color: Rgba<u8>) {
        let half = width.max(1.0) * 0.5;
        let dir = (to - from).normalize_or_zero();

        let (along, across) = if dir == DVec2::ZERO {
            (DVec2::new(half, 0.0), DVec2::new(0.0, half))
        } else {
            (DVec2::ZERO, dir.perp() * half)
        };

        let quad = [
            from - along + across,
            to + along + across,
            to + along - across,
            from - along - across,
        ];
        self.fill_polygon(&quad, color);
    }
}
