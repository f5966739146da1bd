// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Set of centre-active receptive fields.
//!
//! The image is tiled into `fields_x * fields_y` rectangular fields. Each field
//! keeps a ring buffer of the most recent points routed to it. A pixel feeds
//! its own field as a centre point and, depending on which half of the field
//! it lies in, up to three neighbouring fields as surround points. Only
//! centre points are rendered or listed.

use crate::check_dimensions;
use evsync_structures::{EventStreamError, Result};
use ndarray::Array2;

/// Contribution of one centre point to the rendered surface.
const CENTRE_WEIGHT: f32 = 0.2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FieldPoint {
    u: u16,
    v: u16,
    centre: bool,
}

#[derive(Debug, Clone)]
struct Field {
    points: Vec<FieldPoint>,
    next: usize,
}

impl Field {
    fn new(capacity: usize) -> Self {
        Self {
            points: vec![FieldPoint::default(); capacity],
            next: 0,
        }
    }

    fn add(&mut self, point: FieldPoint) {
        self.points[self.next] = point;
        self.next += 1;
        if self.next >= self.points.len() {
            self.next = 0;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Connection {
    field: u32,
    centre: bool,
}

#[derive(Debug, Clone)]
pub struct ReceptiveFieldSurface {
    width: usize,
    height: usize,
    fields_x: usize,
    fields_y: usize,
    fields: Vec<Field>,
    // at most: own field, one vertical, one horizontal, one diagonal
    connections: Vec<[Option<Connection>; 4]>,
}

impl ReceptiveFieldSurface {
    /// Tile a `width x height` image into square fields of `field_size` pixels.
    pub fn with_field_size(width: usize, height: usize, field_size: usize) -> Result<Self> {
        if field_size == 0 {
            return Err(EventStreamError::InvalidConfiguration(
                "receptive field size must be positive".to_string(),
            ));
        }
        Self::new(width, height, width / field_size, height / field_size, 1.0)
    }

    /// Each field remembers `field_area * alpha / 2` points.
    pub fn new(width: usize, height: usize, fields_x: usize, fields_y: usize, alpha: f64) -> Result<Self> {
        check_dimensions(width, height)?;
        if fields_x == 0 || fields_y == 0 || fields_x > width || fields_y > height {
            return Err(EventStreamError::InvalidConfiguration(format!(
                "cannot tile {}x{} image into {}x{} receptive fields",
                width, height, fields_x, fields_y
            )));
        }
        let field_w = width / fields_x;
        let field_h = height / fields_y;
        let capacity = ((field_w * field_h) as f64 * alpha * 0.5) as usize;
        if capacity == 0 {
            return Err(EventStreamError::InvalidConfiguration(format!(
                "receptive field of {}x{} with alpha {} holds no points",
                field_w, field_h, alpha
            )));
        }

        let mut connections = vec![[None; 4]; width * height];
        for y in 0..height {
            for x in 0..width {
                let fx = x / field_w;
                let fy = y / field_h;
                if fx >= fields_x || fy >= fields_y {
                    continue;
                }
                let index = |u: usize, v: usize| (v * fields_x + u) as u32;

                let top = (y % field_h) * 2 < field_h && fy > 0;
                let bottom = (y % field_h) * 2 >= field_h && fy + 1 < fields_y;
                let left = (x % field_w) * 2 < field_w && fx > 0;
                let right = (x % field_w) * 2 >= field_w && fx + 1 < fields_x;

                let mut targets = vec![(index(fx, fy), true)];
                if top {
                    targets.push((index(fx, fy - 1), false));
                }
                if bottom {
                    targets.push((index(fx, fy + 1), false));
                }
                if left {
                    targets.push((index(fx - 1, fy), false));
                }
                if right {
                    targets.push((index(fx + 1, fy), false));
                }
                if top && left {
                    targets.push((index(fx - 1, fy - 1), false));
                }
                if top && right {
                    targets.push((index(fx + 1, fy - 1), false));
                }
                if bottom && left {
                    targets.push((index(fx - 1, fy + 1), false));
                }
                if bottom && right {
                    targets.push((index(fx + 1, fy + 1), false));
                }

                let slot = &mut connections[y * width + x];
                for (i, (field, centre)) in targets.into_iter().enumerate() {
                    slot[i] = Some(Connection { field, centre });
                }
            }
        }

        Ok(Self {
            width,
            height,
            fields_x,
            fields_y,
            fields: vec![Field::new(capacity); fields_x * fields_y],
            connections,
        })
    }

    pub fn field_count(&self) -> (usize, usize) {
        (self.fields_x, self.fields_y)
    }

    /// Route pixel `(u, v)` into its fields. Returns `false` outside the image.
    pub fn update(&mut self, u: usize, v: usize) -> bool {
        if u >= self.width || v >= self.height {
            return false;
        }
        for connection in self.connections[v * self.width + u].iter().flatten() {
            self.fields[connection.field as usize].add(FieldPoint {
                u: u as u16,
                v: v as u16,
                centre: connection.centre,
            });
        }
        true
    }

    /// Render every remembered centre point as `+0.2` at its pixel.
    pub fn surface(&self) -> Array2<f32> {
        let mut img = Array2::<f32>::zeros((self.height, self.width));
        for field in &self.fields {
            for p in field.points.iter().filter(|p| p.centre) {
                img[[p.v as usize, p.u as usize]] += CENTRE_WEIGHT;
            }
        }
        img
    }

    /// Centre points remembered by field `(field_u, field_v)`.
    pub fn points(&self, field_u: usize, field_v: usize) -> Result<Vec<(u16, u16)>> {
        if field_u >= self.fields_x || field_v >= self.fields_y {
            return Err(EventStreamError::InvalidArgument(format!(
                "receptive field ({}, {}) outside {}x{}",
                field_u, field_v, self.fields_x, self.fields_y
            )));
        }
        Ok(self.fields[field_v * self.fields_x + field_u]
            .points
            .iter()
            .filter(|p| p.centre)
            .map(|p| (p.u, p.v))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centre_point_lands_in_own_field() {
        let mut rf = ReceptiveFieldSurface::with_field_size(8, 8, 4).unwrap();
        assert_eq!(rf.field_count(), (2, 2));
        assert!(rf.update(1, 1));
        assert_eq!(rf.points(0, 0).unwrap(), vec![(1, 1)]);
        assert!(rf.points(1, 0).unwrap().is_empty());
    }

    #[test]
    fn test_surround_points_are_not_listed() {
        let mut rf = ReceptiveFieldSurface::with_field_size(8, 8, 4).unwrap();
        // lower-right quadrant of field (0,0) also feeds (1,0), (0,1) and (1,1)
        rf.update(3, 3);
        assert_eq!(rf.points(0, 0).unwrap(), vec![(3, 3)]);
        for (u, v) in [(1, 0), (0, 1), (1, 1)] {
            assert!(rf.points(u, v).unwrap().is_empty());
        }
        let surface = rf.surface();
        assert!((surface[[3, 3]] - CENTRE_WEIGHT).abs() < 1e-6);
        assert_eq!(surface.iter().filter(|v| **v > 0.0).count(), 1);
    }

    #[test]
    fn test_ring_buffer_keeps_most_recent() {
        // field area 4, alpha 1 -> two points
        let mut rf = ReceptiveFieldSurface::new(4, 4, 2, 2, 1.0).unwrap();
        rf.update(0, 0);
        rf.update(1, 0);
        rf.update(0, 1);
        let mut pts = rf.points(0, 0).unwrap();
        pts.sort();
        assert_eq!(pts, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_invalid_layouts() {
        assert!(ReceptiveFieldSurface::with_field_size(8, 8, 0).is_err());
        assert!(ReceptiveFieldSurface::new(8, 8, 0, 2, 1.0).is_err());
        assert!(ReceptiveFieldSurface::new(2, 2, 2, 2, 1.0).is_err());
        let rf = ReceptiveFieldSurface::with_field_size(8, 8, 4).unwrap();
        assert!(rf.points(2, 0).is_err());
    }

    #[test]
    fn test_out_of_range_pixel_ignored() {
        let mut rf = ReceptiveFieldSurface::with_field_size(8, 8, 4).unwrap();
        assert!(!rf.update(8, 0));
    }
}
