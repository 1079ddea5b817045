// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Dispatch sizing.
//!
//! Work is dispatched in work-groups of a fixed shape.  [`plan`] converts a logical
//! problem size into group counts by ceiling division, so every element is covered:
//!
//! ```
//! use dispatch_and_barriers::dispatch::{plan_2d, WorkGroupShape};
//!
//! let plan = plan_2d(513, 256, WorkGroupShape::SIZE_8X8).unwrap();
//! assert_eq!(plan.group_counts(), [65, 32, 1]);
//! // 65 * 8 = 520 columns are invoked for 513 pixels; the kernel masks the rest.
//! assert_eq!(plan.overshoot(), [7, 0, 0]);
//! ```
//!
//! Coverage is full but not exact.  Programs must bounds-check their invocation ids.

use crate::error::{Error, Result};

/// Invocations per work-group along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkGroupShape {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkGroupShape {
    /// The 8x8 tile the image demos use.
    pub const SIZE_8X8: Self = Self { x: 8, y: 8, z: 1 };
    pub const SIZE_16X16: Self = Self { x: 16, y: 16, z: 1 };
    pub const SIZE_64: Self = Self { x: 64, y: 1, z: 1 };
    pub const SIZE_256: Self = Self { x: 256, y: 1, z: 1 };

    /// Fails with [`Error::InvalidDispatch`] if any axis is zero.
    pub fn new(x: u32, y: u32, z: u32) -> Result<Self> {
        if x == 0 || y == 0 || z == 0 {
            return Err(Error::invalid_dispatch(format!(
                "work-group shape {x}x{y}x{z} has a zero axis"
            )));
        }
        Ok(Self { x, y, z })
    }

    pub fn d1(x: u32) -> Result<Self> {
        Self::new(x, 1, 1)
    }

    pub fn d2(x: u32, y: u32) -> Result<Self> {
        Self::new(x, y, 1)
    }

    pub const fn invocations(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    pub const fn to_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Logical extent of the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProblemSize {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl ProblemSize {
    pub const fn to_array(&self) -> [u32; 3] {
        [self.width, self.height, self.depth]
    }
}

/// Group counts derived from a problem size and a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchPlan {
    groups: [u32; 3],
    shape: WorkGroupShape,
    problem: ProblemSize,
}

impl DispatchPlan {
    pub const fn group_counts(&self) -> [u32; 3] {
        self.groups
    }

    pub const fn shape(&self) -> WorkGroupShape {
        self.shape
    }

    pub const fn problem(&self) -> ProblemSize {
        self.problem
    }

    pub const fn total_groups(&self) -> u64 {
        self.groups[0] as u64 * self.groups[1] as u64 * self.groups[2] as u64
    }

    /// Every invocation the device will run, including the masked over-shoot.
    pub const fn total_invocations(&self) -> u64 {
        self.total_groups() * self.shape.invocations()
    }

    /// Invocations beyond the problem edge, per axis.
    pub fn overshoot(&self) -> [u32; 3] {
        let shape = self.shape.to_array();
        let problem = self.problem.to_array();
        std::array::from_fn(|i| self.groups[i] * shape[i] - problem[i])
    }

    /// Fails with [`Error::InvalidDispatch`] if any axis needs more groups than `max`.
    pub fn check_limit(&self, max: u32) -> Result<()> {
        if let Some(axis) = self.groups.iter().position(|g| *g > max) {
            return Err(Error::invalid_dispatch(format!(
                "{} groups along axis {axis} exceeds the device limit of {max}",
                self.groups[axis]
            )));
        }
        Ok(())
    }
}

/// Plans a dispatch covering `width x height x depth` with `shape`.
///
/// Fails with [`Error::InvalidDispatch`] when any extent is zero or the group count
/// would overflow.
pub fn plan(width: u32, height: u32, depth: u32, shape: WorkGroupShape) -> Result<DispatchPlan> {
    let problem = ProblemSize {
        width,
        height,
        depth,
    };
    if width == 0 || height == 0 || depth == 0 {
        return Err(Error::invalid_dispatch(format!(
            "empty problem {width}x{height}x{depth}"
        )));
    }
    // shapes built by hand bypass WorkGroupShape::new
    if shape.x == 0 || shape.y == 0 || shape.z == 0 {
        return Err(Error::invalid_dispatch(format!(
            "work-group shape {:?} has a zero axis",
            shape
        )));
    }
    let groups = [
        width.div_ceil(shape.x),
        height.div_ceil(shape.y),
        depth.div_ceil(shape.z),
    ];
    for (g, s) in groups.iter().zip(shape.to_array()) {
        if g.checked_mul(s).is_none() {
            return Err(Error::invalid_dispatch(format!(
                "{g} groups of {s} overflows the invocation id range"
            )));
        }
    }
    Ok(DispatchPlan {
        groups,
        shape,
        problem,
    })
}

pub fn plan_1d(elements: u32, shape: WorkGroupShape) -> Result<DispatchPlan> {
    plan(elements, 1, 1, shape)
}

pub fn plan_2d(width: u32, height: u32, shape: WorkGroupShape) -> Result<DispatchPlan> {
    plan(width, height, 1, shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_uneven_extents() {
        for w in [1u32, 7, 8, 9, 255, 256, 257, 513, 1023] {
            for h in [1u32, 3, 16, 17, 100] {
                let p = plan_2d(w, h, WorkGroupShape::SIZE_8X8).unwrap();
                let [gx, gy, gz] = p.group_counts();
                assert!(gx * 8 >= w && (gx - 1) * 8 < w);
                assert!(gy * 8 >= h && (gy - 1) * 8 < h);
                assert_eq!(gz, 1);
            }
        }
    }

    #[test]
    fn exact_fit_has_no_overshoot() {
        let p = plan_2d(512, 256, WorkGroupShape::SIZE_8X8).unwrap();
        assert_eq!(p.group_counts(), [64, 32, 1]);
        assert_eq!(p.overshoot(), [0, 0, 0]);
        assert_eq!(p.total_invocations(), 512 * 256);
    }

    #[test]
    fn one_dimensional_plans() {
        let p = plan_1d(1000, WorkGroupShape::SIZE_64).unwrap();
        assert_eq!(p.group_counts(), [16, 1, 1]);
        assert_eq!(p.overshoot(), [24, 0, 0]);
    }

    #[test]
    fn zero_extents_and_shapes_are_rejected() {
        assert!(matches!(
            plan_2d(0, 8, WorkGroupShape::SIZE_8X8),
            Err(Error::InvalidDispatch(_))
        ));
        assert!(WorkGroupShape::d2(8, 0).is_err());
        let bogus = WorkGroupShape { x: 0, y: 1, z: 1 };
        assert!(plan_1d(4, bogus).is_err());
    }

    #[test]
    fn limits_are_enforced() {
        let p = plan_1d(65_536 * 64 + 1, WorkGroupShape::SIZE_64).unwrap();
        assert_eq!(p.group_counts()[0], 65_537);
        assert!(p.check_limit(65_535).is_err());
        assert!(plan_1d(64, WorkGroupShape::SIZE_64).unwrap().check_limit(1).is_ok());
    }
}
