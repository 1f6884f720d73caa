//! # Generation
//! A shared counter that invalidates callbacks. A subscription captures the token current when it was opened;
//! advancing the counter (on stop or restart) turns every callback holding an older token into a no-op.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationToken(u64);

#[derive(Clone, Debug, Default)]
pub struct Generation {
    current: Rc<Cell<u64>>,
}

impl Generation {
    pub fn current(&self) -> GenerationToken {
        GenerationToken(self.current.get())
    }

    /// Invalidates every outstanding token and returns the new one.
    pub fn advance(&self) -> GenerationToken {
        let next = self.current.get().wrapping_add(1);
        self.current.set(next);
        GenerationToken(next)
    }

    pub fn is_current(&self, token: GenerationToken) -> bool {
        self.current.get() == token.0
    }
}
