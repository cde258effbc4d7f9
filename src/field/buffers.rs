use glam::Vec3;

/// Which buffers changed since the renderer last uploaded them
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dirty {
    pub positions: bool,
    pub colors: bool,
}

impl Dirty {
    pub fn any(&self) -> bool {
        self.positions || self.colors
    }
}

/// Flat position/color buffers, three floats per point, indexed by point.
/// Writes outside the point count are rejected instead of spilling into a
/// neighbour's components.
#[derive(Clone, Debug)]
pub struct PointBuffers {
    positions: Vec<f32>,
    colors: Vec<f32>,
    dirty: Dirty,
}

impl PointBuffers {
    pub fn new(count: usize) -> Self {
        Self {
            positions: vec![0.0; count * 3],
            colors: vec![0.0; count * 3],
            dirty: Dirty {
                positions: true,
                colors: true,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, index: usize) -> Option<Vec3> {
        let p = self.positions.get(index * 3..index * 3 + 3)?;
        Some(Vec3::new(p[0], p[1], p[2]))
    }

    pub fn set_position(&mut self, index: usize, position: Vec3) -> bool {
        match self.positions.get_mut(index * 3..index * 3 + 3) {
            Some(slot) => {
                slot.copy_from_slice(&position.to_array());
                self.dirty.positions = true;
                true
            }
            None => false,
        }
    }

    pub fn color(&self, index: usize) -> Option<[f32; 3]> {
        let c = self.colors.get(index * 3..index * 3 + 3)?;
        Some([c[0], c[1], c[2]])
    }

    pub fn set_color(&mut self, index: usize, rgb: [f32; 3]) -> bool {
        match self.colors.get_mut(index * 3..index * 3 + 3) {
            Some(slot) => {
                slot.copy_from_slice(&rgb);
                self.dirty.colors = true;
                true
            }
            None => false,
        }
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn dirty(&self) -> Dirty {
        self.dirty
    }

    /// Return the dirty flags and clear them; the renderer calls this right
    /// before re-uploading.
    pub fn take_dirty(&mut self) -> Dirty {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_are_bounds_checked() {
        let mut buffers = PointBuffers::new(2);
        assert_eq!(buffers.len(), 2);
        assert!(buffers.set_position(1, Vec3::new(1.0, 2.0, 3.0)));
        assert!(!buffers.set_position(2, Vec3::ONE));
        assert!(!buffers.set_color(5, [1.0; 3]));
        assert_eq!(buffers.position(1), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(buffers.position(2), None);
        assert_eq!(buffers.positions(), &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn dirty_flags_are_consumed() {
        let mut buffers = PointBuffers::new(1);
        assert!(buffers.take_dirty().any());
        assert!(!buffers.dirty().any());

        buffers.set_color(0, [0.5, 0.5, 0.5]);
        assert_eq!(
            buffers.take_dirty(),
            Dirty {
                positions: false,
                colors: true
            }
        );
        assert!(!buffers.take_dirty().any());
    }
}
