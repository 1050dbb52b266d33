//! Variable labels.
//!
//! A [`Vid`] is the internal label a node branches on -- what spec.md
//! calls a *variable label*, as opposed to a user-visible *level*. The
//! [`crate::levels`] module maintains the level<->label bijection that
//! reordering mutates; code that just wants to compare "which node is
//! closer to the root" works directly with `Vid`, exactly as the teacher's
//! `vid::VID` exposes `cmp_depth`/`is_above`/`is_below` instead of raw
//! integer comparison (so the ordering convention only needs to be
//! correct in one place).
use std::cmp::Ordering;
use std::fmt;

#[derive(Eq, PartialEq, Debug)]
pub enum VidOrdering { Above, Level, Below }

/// A variable label. Smaller labels are closer to the root: on every
/// root-to-leaf path, labels increase strictly going down, so `top_var`
/// of a set of nodes is simply the minimum label. `TOP` is reserved for
/// the constants O/I, sorting below every real variable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Vid(u32);

impl Vid {
    pub const TOP: Vid = Vid(u32::MAX);

    #[inline]
    pub const fn new(label: u32) -> Self {
        assert!(label != u32::MAX, "label u32::MAX is reserved for Vid::TOP");
        Vid(label)
    }

    #[inline]
    pub fn label(&self) -> u32 { self.0 }

    #[inline]
    pub fn is_top(&self) -> bool { *self == Vid::TOP }

    pub fn cmp_depth(&self, other: &Vid) -> VidOrdering {
        match self.0.cmp(&other.0) {
            Ordering::Less => VidOrdering::Above,
            Ordering::Equal => VidOrdering::Level,
            Ordering::Greater => VidOrdering::Below,
        }
    }

    #[inline]
    pub fn is_above(&self, other: &Vid) -> bool { self.cmp_depth(other) == VidOrdering::Above }
    #[inline]
    pub fn is_below(&self, other: &Vid) -> bool { self.cmp_depth(other) == VidOrdering::Below }
}

/// The topmost (smallest-labeled, non-TOP-preferring) of two variables.
pub fn topmost(x: Vid, y: Vid) -> Vid { if x.is_above(&y) { x } else { y } }
pub fn topmost_of3(x: Vid, y: Vid, z: Vid) -> Vid { topmost(x, topmost(y, z)) }

impl fmt::Display for Vid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_top() { write!(f, "T") } else { write!(f, "x{}", self.0) }
    }
}
impl fmt::Debug for Vid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{self}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let (x0, x1) = (Vid::new(0), Vid::new(1));
        assert!(x0.is_above(&x1));
        assert!(x1.is_below(&x0));
        assert!(x0.is_above(&Vid::TOP));
        assert_eq!(topmost(x0, x1), x0);
        assert_eq!(topmost_of3(x1, x0, Vid::TOP), x0);
    }
}
