//! Border following (Suzuki & Abe) and hierarchy construction.

use crate::engine::{ContourApproximation, Point};
use crate::mat::HierarchyEntry;

// Neighbor offsets in clockwise order (y grows downwards), starting west.
const DIRS: [(isize, isize); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];
const EAST: usize = 4;

/// A traced border.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Border {
    pub points: Vec<Point>,
    pub is_hole: bool,
    pub parent: Option<usize>,
}

fn dir_index(dx: isize, dy: isize) -> usize {
    DIRS.iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or(0)
}

/// Trace every border of a single-channel image. Non-zero pixels are
/// foreground; the image is treated as surrounded by background.
pub(crate) fn find_borders(pixels: &[u8], width: usize, height: usize) -> Vec<Border> {
    // One pixel of background padding on every side.
    let stride = width + 2;
    let mut grid = vec![0i32; stride * (height + 2)];
    for y in 0..height {
        for x in 0..width {
            if pixels[y * width + x] != 0 {
                grid[(y + 1) * stride + x + 1] = 1;
            }
        }
    }

    let at = |x: isize, y: isize| y as usize * stride + x as usize;
    let mut borders: Vec<Border> = Vec::new();
    let mut nbd: i32 = 1;

    for y in 1..=height as isize {
        let mut lnbd: i32 = 1;
        for x in 1..=width as isize {
            let v = grid[at(x, y)];
            if v == 0 {
                continue;
            }

            let start = if v == 1 && grid[at(x - 1, y)] == 0 {
                Some((false, (x - 1, y)))
            } else if v >= 1 && grid[at(x + 1, y)] == 0 {
                Some((true, (x + 1, y)))
            } else {
                None
            };

            if let Some((is_hole, adj)) = start {
                nbd += 1;
                if is_hole && v > 1 {
                    // The hole starts on an already traced border.
                    lnbd = v;
                }

                // lnbd == 1 is the frame, which acts as a hole with no parent.
                let parent = if lnbd > 1 {
                    let idx = (lnbd - 2) as usize;
                    if borders[idx].is_hole != is_hole {
                        Some(idx)
                    } else {
                        borders[idx].parent
                    }
                } else {
                    None
                };

                let points = trace(&mut grid, stride, (x, y), adj, nbd)
                    .into_iter()
                    .map(|(px, py)| Point::new(px as i32 - 1, py as i32 - 1))
                    .collect();

                borders.push(Border {
                    points,
                    is_hole,
                    parent,
                });
            }

            let current = grid[at(x, y)];
            if current != 1 {
                lnbd = current.abs();
            }
        }
    }

    borders
}

fn trace(
    grid: &mut [i32],
    stride: usize,
    start: (isize, isize),
    adj: (isize, isize),
    nbd: i32,
) -> Vec<(isize, isize)> {
    let at = |(x, y): (isize, isize)| y as usize * stride + x as usize;
    let step = |(x, y): (isize, isize), d: usize| (x + DIRS[d].0, y + DIRS[d].1);

    let first = dir_index(adj.0 - start.0, adj.1 - start.1);
    let pos1 = (0..8)
        .map(|k| step(start, (first + k) % 8))
        .find(|&p| grid[at(p)] != 0);

    let Some(pos1) = pos1 else {
        grid[at(start)] = -nbd;
        return vec![start];
    };

    let mut points = Vec::new();
    let mut pos2 = pos1;
    let mut pos3 = start;

    loop {
        points.push(pos3);

        // Counterclockwise from the neighbor after pos2.
        let back = dir_index(pos2.0 - pos3.0, pos2.1 - pos3.1);
        let mut east_examined = false;
        let mut pos4 = pos2;
        for k in 1..=8 {
            let d = (back + 8 - k) % 8;
            let p = step(pos3, d);
            if grid[at(p)] != 0 {
                pos4 = p;
                break;
            }
            if d == EAST {
                east_examined = true;
            }
        }

        if east_examined {
            grid[at(pos3)] = -nbd;
        } else if grid[at(pos3)] == 1 {
            grid[at(pos3)] = nbd;
        }

        if pos4 == start && pos3 == pos1 {
            break;
        }
        pos2 = pos3;
        pos3 = pos4;
    }

    points
}

/// Keep only the points where the chain changes direction.
pub(crate) fn approximate(points: Vec<Point>, method: ContourApproximation) -> Vec<Point> {
    if method == ContourApproximation::None || points.len() <= 2 {
        return points;
    }

    let n = points.len();
    let kept: Vec<Point> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let cur = points[i];
            let next = points[(i + 1) % n];
            (cur.x - prev.x, cur.y - prev.y) != (next.x - cur.x, next.y - cur.y)
        })
        .map(|i| points[i])
        .collect();

    if kept.is_empty() {
        vec![points[0]]
    } else {
        kept
    }
}

/// Two-level parent index of every border (`-1` for none).
///
/// Holes hang off the outer border enclosing them; every outer border,
/// however deeply nested, is top level.
pub(crate) fn two_level_parents(borders: &[Border]) -> Vec<i32> {
    borders
        .iter()
        .map(|b| {
            if b.is_hole {
                b.parent.map_or(-1, |p| p as i32)
            } else {
                -1
            }
        })
        .collect()
}

/// Build `[next, previous, first_child, parent]` rows from parent indices,
/// which must refer to positions in the same slice.
pub(crate) fn link_hierarchy(parents: &[i32]) -> Vec<HierarchyEntry> {
    let mut entries = vec![[-1i32; 4]; parents.len()];
    let mut last_child: std::collections::HashMap<i32, usize> = std::collections::HashMap::new();

    for (i, &parent) in parents.iter().enumerate() {
        entries[i][3] = parent;
        if let Some(&prev) = last_child.get(&parent) {
            entries[prev][0] = i as i32;
            entries[i][1] = prev as i32;
        } else if parent >= 0 {
            entries[parent as usize][2] = i as i32;
        }
        last_child.insert(parent, i);
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(rows: &[&str]) -> (Vec<u8>, usize, usize) {
        let h = rows.len();
        let w = rows[0].len();
        let data = rows
            .iter()
            .flat_map(|r| r.bytes().map(|b| if b == b'#' { 255 } else { 0 }))
            .collect();
        (data, w, h)
    }

    #[test]
    fn test_blank_image_has_no_borders() {
        let (data, w, h) = image(&["....", "....", "...."]);
        assert!(find_borders(&data, w, h).is_empty());
    }

    #[test]
    fn test_single_pixel() {
        let (data, w, h) = image(&["...", ".#.", "..."]);
        let borders = find_borders(&data, w, h);
        assert_eq!(borders.len(), 1);
        assert_eq!(borders[0].points, vec![Point::new(1, 1)]);
        assert!(!borders[0].is_hole);
    }

    #[test]
    fn test_filled_square_simple_approximation() {
        let (data, w, h) = image(&["......", ".####.", ".####.", ".####.", "......"]);
        let borders = find_borders(&data, w, h);
        assert_eq!(borders.len(), 1);
        let corners = approximate(borders[0].points.clone(), ContourApproximation::Simple);
        assert_eq!(corners.len(), 4);
        for corner in [
            Point::new(1, 1),
            Point::new(4, 1),
            Point::new(4, 3),
            Point::new(1, 3),
        ] {
            assert!(corners.contains(&corner), "missing {corner:?}");
        }
    }

    #[test]
    fn test_ring_has_outer_and_hole() {
        let (data, w, h) = image(&[
            ".......", ".#####.", ".#...#.", ".#...#.", ".#####.", ".......",
        ]);
        let borders = find_borders(&data, w, h);
        assert_eq!(borders.len(), 2);
        assert!(!borders[0].is_hole);
        assert!(borders[1].is_hole);
        assert_eq!(borders[1].parent, Some(0));

        assert_eq!(two_level_parents(&borders), vec![-1, 0]);
    }

    #[test]
    fn test_full_foreground_touching_edges() {
        let (data, w, h) = image(&["###", "###"]);
        let borders = find_borders(&data, w, h);
        assert_eq!(borders.len(), 1);
        let corners = approximate(borders[0].points.clone(), ContourApproximation::Simple);
        assert_eq!(corners.len(), 4);
        assert!(corners.contains(&Point::new(0, 0)));
        assert!(corners.contains(&Point::new(2, 1)));
    }

    #[test]
    fn test_link_hierarchy_siblings_and_children() {
        // 0 and 2 are top level, 1 and 3 are children of 0.
        let entries = link_hierarchy(&[-1, 0, -1, 0]);
        assert_eq!(entries[0], [2, -1, 1, -1]);
        assert_eq!(entries[1], [3, -1, -1, 0]);
        assert_eq!(entries[2], [-1, 0, -1, -1]);
        assert_eq!(entries[3], [-1, 1, -1, 0]);
    }
}
