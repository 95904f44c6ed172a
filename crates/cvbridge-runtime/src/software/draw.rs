//! Rasterization of contour polylines.

use crate::engine::Point;

/// Mutable view of an interleaved 8-bit image.
pub(crate) struct Canvas<'a> {
    pub data: &'a mut [u8],
    pub width: i32,
    pub height: i32,
    pub channels: usize,
}

impl Canvas<'_> {
    fn put(&mut self, x: i32, y: i32, color: &[u8; 4]) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * self.channels;
        let n = self.channels.min(4);
        self.data[offset..offset + n].copy_from_slice(&color[..n]);
    }

    fn dot(&mut self, x: i32, y: i32, color: &[u8; 4], thickness: i32) {
        if thickness <= 1 {
            self.put(x, y, color);
            return;
        }
        let r = thickness / 2;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.put(x + dx, y + dy, color);
                }
            }
        }
    }

    /// 8-connected Bresenham line.
    pub fn line(&mut self, a: Point, b: Point, color: &[u8; 4], thickness: i32) {
        let (mut x, mut y) = (a.x, a.y);
        let dx = (b.x - a.x).abs();
        let dy = -(b.y - a.y).abs();
        let sx = if a.x < b.x { 1 } else { -1 };
        let sy = if a.y < b.y { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.dot(x, y, color, thickness);
            if x == b.x && y == b.y {
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

    /// Closed polyline through `points`.
    pub fn polygon(&mut self, points: &[Point], color: &[u8; 4], thickness: i32) {
        match points {
            [] => {}
            [only] => self.dot(only.x, only.y, color, thickness),
            _ => {
                for (i, &p) in points.iter().enumerate() {
                    let q = points[(i + 1) % points.len()];
                    self.line(p, q, color, thickness);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: [u8; 4] = [0, 255, 0, 0];

    fn lit(data: &[u8], width: usize) -> Vec<(usize, usize)> {
        data.chunks_exact(3)
            .enumerate()
            .filter(|(_, px)| px[1] == 255)
            .map(|(i, _)| (i % width, i / width))
            .collect()
    }

    #[test]
    fn test_diagonal_line_is_one_pixel_per_step() {
        let mut data = vec![0u8; 5 * 5 * 3];
        let mut canvas = Canvas {
            data: &mut data,
            width: 5,
            height: 5,
            channels: 3,
        };
        canvas.line(Point::new(0, 0), Point::new(4, 4), &GREEN, 1);
        assert_eq!(lit(&data, 5).len(), 5);
    }

    #[test]
    fn test_polygon_outlines_rectangle() {
        let mut data = vec![0u8; 6 * 5 * 3];
        let mut canvas = Canvas {
            data: &mut data,
            width: 6,
            height: 5,
            channels: 3,
        };
        let rect = [
            Point::new(1, 1),
            Point::new(4, 1),
            Point::new(4, 3),
            Point::new(1, 3),
        ];
        canvas.polygon(&rect, &GREEN, 1);
        let pixels = lit(&data, 6);
        assert_eq!(pixels.len(), 10);
        assert!(!pixels.contains(&(2, 2)));
    }

    #[test]
    fn test_out_of_bounds_is_clipped() {
        let mut data = vec![0u8; 2 * 2 * 3];
        let mut canvas = Canvas {
            data: &mut data,
            width: 2,
            height: 2,
            channels: 3,
        };
        canvas.line(Point::new(-3, 0), Point::new(5, 0), &GREEN, 1);
        assert_eq!(lit(&data, 2).len(), 2);
    }
}
