//! The conditional-compilation stack machine. One frame per open
//! `#if`/`#ifdef`/`#ifndef`; `#elif`/`#else` mutate the top frame and
//! `#endif` pops it. Tokens are emitted only while every frame on the stack
//! is in its live branch.

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug)]
struct Frame {
    /// Some branch of this level has already matched.
    taken: bool,
    /// The branch currently being read should emit tokens.
    active: bool,
    /// Guards against a second `#else` on the same level.
    saw_else: bool,
    /// Line of the opening `#if`, for unterminated-conditional reporting.
    line: usize,
}

#[derive(Debug, Default)]
pub struct BranchTracker {
    frames: Vec<Frame>,
}

impl BranchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Line of the outermost still-open conditional, if any.
    pub fn unterminated_line(&self) -> Option<usize> {
        self.frames.first().map(|frame| frame.line)
    }

    /// An inner frame only emits if every enclosing frame does too.
    fn composed(&self) -> bool {
        self.frames.iter().all(|frame| frame.active)
    }

    /// Activity of every frame but the innermost. Gates whether an `#elif`
    /// condition is worth evaluating at all.
    pub fn enclosing_active(&self) -> bool {
        let n = self.frames.len();
        n == 0 || self.frames[..n - 1].iter().all(|frame| frame.active)
    }

    pub fn push_if(&mut self, condition: bool, line: usize) -> bool {
        self.frames.push(Frame {
            taken: condition,
            active: condition,
            saw_else: false,
            line,
        });
        self.composed()
    }

    pub fn elif(&mut self, condition: bool, line: usize) -> Result<bool> {
        let frame = self.frames.last_mut().ok_or(Error::ConditionalSequence {
            line,
            message: "#elif without matching #if".to_string(),
        })?;
        if frame.saw_else {
            return Err(Error::ConditionalSequence {
                line,
                message: "#elif after #else".to_string(),
            });
        }
        frame.active = condition && !frame.taken;
        if frame.active {
            frame.taken = true;
        }
        Ok(self.composed())
    }

    pub fn else_(&mut self, line: usize) -> Result<bool> {
        let frame = self.frames.last_mut().ok_or(Error::ConditionalSequence {
            line,
            message: "#else without matching #if".to_string(),
        })?;
        if frame.saw_else {
            return Err(Error::ConditionalSequence {
                line,
                message: "duplicate #else".to_string(),
            });
        }
        frame.saw_else = true;
        frame.active = !frame.taken;
        if frame.active {
            frame.taken = true;
        }
        Ok(self.composed())
    }

    pub fn endif(&mut self, line: usize) -> Result<bool> {
        if self.frames.pop().is_none() {
            return Err(Error::ConditionalSequence {
                line,
                message: "#endif without matching #if".to_string(),
            });
        }
        Ok(self.composed())
    }
}

#[cfg(test)]
mod test {
    use super::BranchTracker;
    use crate::error::Error;
    use test_log::test;

    #[test]
    fn single_taken_branch() {
        let mut branches = BranchTracker::new();
        assert!(branches.push_if(true, 1));
        assert_eq!(branches.depth(), 1);
        assert!(branches.endif(3).unwrap());
        assert_eq!(branches.depth(), 0);
    }

    #[test]
    fn at_most_one_branch_is_live() {
        let mut branches = BranchTracker::new();
        assert!(!branches.push_if(false, 1));
        assert!(branches.elif(true, 2).unwrap());
        assert!(!branches.elif(true, 3).unwrap());
        assert!(!branches.else_(4).unwrap());
        assert!(branches.endif(5).unwrap());
    }

    #[test]
    fn else_takes_over_when_nothing_matched() {
        let mut branches = BranchTracker::new();
        assert!(!branches.push_if(false, 1));
        assert!(!branches.elif(false, 2).unwrap());
        assert!(branches.else_(3).unwrap());
        assert!(branches.endif(4).unwrap());
    }

    #[test]
    fn inner_frames_are_gated_by_outer_inactive_frames() {
        let mut branches = BranchTracker::new();
        assert!(!branches.push_if(false, 1));
        // The whole inner group is dead regardless of its own conditions.
        assert!(!branches.push_if(true, 2));
        assert!(!branches.elif(true, 3).unwrap());
        assert!(!branches.else_(4).unwrap());
        assert!(!branches.endif(5).unwrap());
        assert!(!branches.else_(6).unwrap());
        assert!(branches.endif(7).unwrap());
        assert_eq!(branches.depth(), 0);
    }

    #[test]
    fn deep_nesting_composes_with_and() {
        let mut branches = BranchTracker::new();
        branches.push_if(true, 1);
        branches.push_if(true, 2);
        assert!(!branches.push_if(false, 3));
        assert!(!branches.push_if(true, 4));
        assert!(!branches.endif(5).unwrap());
        assert!(branches.else_(6).unwrap());
        assert!(branches.endif(7).unwrap());
        assert!(branches.endif(8).unwrap());
        assert!(branches.endif(9).unwrap());
    }

    #[test]
    fn misuse_on_empty_stack_is_an_error() {
        let mut branches = BranchTracker::new();
        assert!(matches!(
            branches.endif(1),
            Err(Error::ConditionalSequence { .. })
        ));
        assert!(matches!(
            branches.elif(true, 1),
            Err(Error::ConditionalSequence { .. })
        ));
        assert!(matches!(
            branches.else_(1),
            Err(Error::ConditionalSequence { .. })
        ));
    }

    #[test]
    fn duplicate_else_is_an_error() {
        let mut branches = BranchTracker::new();
        branches.push_if(false, 1);
        branches.else_(2).unwrap();
        assert!(matches!(
            branches.else_(3),
            Err(Error::ConditionalSequence { .. })
        ));
        assert!(matches!(
            branches.elif(true, 4),
            Err(Error::ConditionalSequence { .. })
        ));
    }

    #[test]
    fn unterminated_line_names_the_outermost_open_if() {
        let mut branches = BranchTracker::new();
        branches.push_if(true, 7);
        branches.push_if(false, 9);
        assert_eq!(branches.unterminated_line(), Some(7));
        branches.endif(10).unwrap();
        assert_eq!(branches.unterminated_line(), Some(7));
        branches.endif(11).unwrap();
        assert_eq!(branches.unterminated_line(), None);
    }
}
