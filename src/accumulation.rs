// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Progressive accumulation state.
//!
//! Progressive renderers blend each new sample into a persistent image with weight
//! `frame_count / (frame_count + 1)` for the old contents.  The estimate is only valid
//! while the scene and view are static, so any change resets the counter and
//! convergence restarts from the next dispatch.  Resetting does not touch the image;
//! a weight of zero discards whatever it holds.

use crate::images::engine::Settled;

/// Frame counter for one progressive image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulationState {
    frame_count: u32,
}

impl AccumulationState {
    pub const fn new() -> Self {
        Self { frame_count: 0 }
    }

    pub const fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Weight of the previously accumulated value in the next blend.
    pub fn blend_weight(&self) -> f32 {
        let n = self.frame_count as f32;
        n / (n + 1.0)
    }

    /// Counts one completed accumulation dispatch.
    ///
    /// Takes the [`Settled`] proof of the dispatch's barrier, so the counter can only
    /// advance once the frame's writes are visible.
    pub fn advance(&mut self, _settled: &Settled) {
        self.frame_count = self.frame_count.saturating_add(1);
    }

    /// Restarts convergence.  Takes effect for the next dispatch's blend weight.
    pub fn invalidate(&mut self) {
        if self.frame_count != 0 {
            logwise::trace_sync!(
                "accumulation reset after {frames} frames",
                frames = self.frame_count
            );
        }
        self.frame_count = 0;
    }

    pub fn uniforms(&self) -> AccumulationUniforms {
        AccumulationUniforms {
            frame_count: self.frame_count,
            blend_weight: self.blend_weight(),
        }
    }
}

/// Uniform block uploaded before each accumulation dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AccumulationUniforms {
    pub frame_count: u32,
    pub blend_weight: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let state = AccumulationState::new();
        assert_eq!(state.frame_count(), 0);
        assert_eq!(state.blend_weight(), 0.0);
    }

    #[test]
    fn invalidate_from_any_count() {
        let settled = Settled::for_testing();
        for n in [0u32, 1, 2, 17, 1000] {
            let mut state = AccumulationState::new();
            for _ in 0..n {
                state.advance(&settled);
            }
            assert_eq!(state.frame_count(), n);
            state.invalidate();
            assert_eq!(state.frame_count(), 0);
            assert_eq!(state.blend_weight(), 0.0);
        }
    }

    #[test]
    fn uniforms_are_tightly_packed() {
        let settled = Settled::for_testing();
        let mut state = AccumulationState::new();
        state.advance(&settled);
        state.advance(&settled);
        state.advance(&settled);
        let bytes = bytemuck::bytes_of(&state.uniforms()).to_vec();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..], &0.75f32.to_le_bytes());
    }
}
