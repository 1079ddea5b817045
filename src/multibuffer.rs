// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Double-buffering by frame parity.

Two equally sized resources alternate between "read source" and "write destination"
roles each frame.  The main idea is,

1.  A monotonically increasing frame counter yields a [`FrameParity`].
2.  A [`PingPong`] pair maps a logical [`Role`] plus a parity onto one of its two
    physical resources.
3.  On even frames the input is `a` and the output is `b`; odd frames swap.

Because the mapping is a pure function of parity, the output of frame N is the input
of frame N+1 without any copy.  A pair is never built from one resource twice, so the
two roles never alias.
*/

use crate::bindings::resource::ResourceId;
use crate::error::{Error, Result};

/// Even or odd, derived from a frame counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameParity {
    Even,
    Odd,
}

impl FrameParity {
    pub const fn of(frame: u64) -> Self {
        if frame % 2 == 0 {
            FrameParity::Even
        } else {
            FrameParity::Odd
        }
    }

    pub const fn flipped(self) -> Self {
        match self {
            FrameParity::Even => FrameParity::Odd,
            FrameParity::Odd => FrameParity::Even,
        }
    }

    pub const fn is_even(self) -> bool {
        matches!(self, FrameParity::Even)
    }
}

/// Logical role of one half of a ping-pong pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Input,
    Output,
}

/// A tagged pair of resources.
///
/// The pair holds no parity of its own.  Roles are always resolved against the
/// engine's [`ComputeEngine::parity`](crate::images::engine::ComputeEngine::parity), and
/// [`ComputeEngine::end_frame`](crate::images::engine::ComputeEngine::end_frame) is the
/// one call per frame that exchanges them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingPong {
    a: ResourceId,
    b: ResourceId,
}

impl PingPong {
    /// Builds a pair.  Fails with [`Error::AliasingViolation`] if both halves name the
    /// same resource.
    pub fn new(a: ResourceId, b: ResourceId) -> Result<Self> {
        if a == b {
            return Err(Error::AliasingViolation {
                resource: a,
                detail: "ping-pong pair built from a single resource".to_string(),
            });
        }
        Ok(Self { a, b })
    }

    /// The physical resource filling `role` on a frame of the given parity.
    pub const fn resolve(&self, role: Role, parity: FrameParity) -> ResourceId {
        match (role, parity) {
            (Role::Input, FrameParity::Even) | (Role::Output, FrameParity::Odd) => self.a,
            (Role::Output, FrameParity::Even) | (Role::Input, FrameParity::Odd) => self.b,
        }
    }

    pub const fn input(&self, parity: FrameParity) -> ResourceId {
        self.resolve(Role::Input, parity)
    }

    pub const fn output(&self, parity: FrameParity) -> ResourceId {
        self.resolve(Role::Output, parity)
    }

    pub const fn resources(&self) -> (ResourceId, ResourceId) {
        (self.a, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> PingPong {
        PingPong::new(ResourceId::for_testing(1), ResourceId::for_testing(2)).unwrap()
    }

    #[test]
    fn parity_alternates() {
        for n in 0..1_000u64 {
            assert_ne!(FrameParity::of(n), FrameParity::of(n + 1));
        }
        assert_ne!(FrameParity::of(u64::MAX - 1), FrameParity::of(u64::MAX));
    }

    #[test]
    fn output_becomes_next_input() {
        let p = pair();
        for n in 0..64u64 {
            let out = p.resolve(Role::Output, FrameParity::of(n));
            let next_in = p.resolve(Role::Input, FrameParity::of(n + 1));
            assert_eq!(out, next_in);
            assert_ne!(
                p.resolve(Role::Input, FrameParity::of(n)),
                p.resolve(Role::Output, FrameParity::of(n))
            );
        }
    }

    #[test]
    fn roles_follow_parity() {
        let p = pair();
        let (a, b) = p.resources();
        assert_eq!((p.input(FrameParity::Even), p.output(FrameParity::Even)), (a, b));
        assert_eq!((p.input(FrameParity::Odd), p.output(FrameParity::Odd)), (b, a));
        assert_eq!(p.output(FrameParity::of(10)), b);
    }

    #[test]
    fn aliased_pair_is_rejected() {
        let r = ResourceId::for_testing(5);
        assert!(matches!(
            PingPong::new(r, r),
            Err(Error::AliasingViolation { resource, .. }) if resource == r
        ));
    }
}
