//! The level<->label bijection (spec.md §3 "Levels table").
//!
//! Node payloads always carry a [`crate::vid::Vid`] *label*. User code
//! that wants identity to survive reordering addresses variables by
//! *level* instead: `level_to_label`/`label_to_level` are the two arrays
//! reordering mutates in lockstep (swapping two adjacent levels just
//! swaps two entries in each array and is O(1), independent of how many
//! nodes reference those labels).
use crate::vid::Vid;

#[derive(Debug, Default)]
pub struct Levels {
    level_to_label: Vec<Vid>,
    label_to_level: Vec<u32>,
}

impl Levels {
    pub fn new() -> Self { Self::default() }

    /// Create a fresh variable, appended at the bottom level. Returns its
    /// label, which is what node payloads store.
    pub fn new_var(&mut self) -> Vid {
        let label = self.level_to_label.len() as u32;
        let level = label;
        let v = Vid::new(label);
        self.level_to_label.push(v);
        self.label_to_level.push(level);
        v
    }

    pub fn num_vars(&self) -> usize { self.level_to_label.len() }

    pub fn label_of_level(&self, level: u32) -> Vid { self.level_to_label[level as usize] }
    pub fn level_of_label(&self, label: Vid) -> u32 { self.label_to_level[label.label() as usize] }

    /// Swap the two variables currently at adjacent levels `level` and
    /// `level+1`. Does not touch any node payload -- the caller
    /// (`reorder::swap`) is responsible for rewriting nodes whose label
    /// changed level so that the root-to-leaf strictly-increasing
    /// invariant keeps holding under the *level* order, not the raw label
    /// order (labels are stable identifiers; levels are what "order"
    /// means operationally).
    pub fn swap_levels(&mut self, level: u32) {
        let (lo, hi) = (level as usize, level as usize + 1);
        self.level_to_label.swap(lo, hi);
        let (a, b) = (self.level_to_label[lo], self.level_to_label[hi]);
        self.label_to_level[a.label() as usize] = lo as u32;
        self.label_to_level[b.label() as usize] = hi as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_var_identity() {
        let mut lv = Levels::new();
        let v0 = lv.new_var();
        let v1 = lv.new_var();
        assert_eq!(lv.level_of_label(v0), 0);
        assert_eq!(lv.level_of_label(v1), 1);
        assert_eq!(lv.label_of_level(0), v0);
    }

    #[test]
    fn test_swap_levels() {
        let mut lv = Levels::new();
        let v0 = lv.new_var();
        let v1 = lv.new_var();
        lv.swap_levels(0);
        assert_eq!(lv.label_of_level(0), v1);
        assert_eq!(lv.label_of_level(1), v0);
        assert_eq!(lv.level_of_label(v0), 1);
        assert_eq!(lv.level_of_label(v1), 0);
    }
}
