use super::{Generator, IdGenerator, IdSource};

/// Wraps a [`Generator`] to return the same existing ID for several consecutive calls.
///
/// After [`get_new`](Generator::get_new), the next `hold` calls to
/// [`get_existing`](Generator::get_existing) return the new ID. The call after that fetches a
/// fresh ID from the inner generator, which is then returned for another `hold` calls, and so on.
///
/// This chains together operations on the same record, like inserting a record and immediately
/// updating it.
#[derive(Debug)]
pub struct Persistent<G = IdGenerator> {
    inner: G,
    hold: u32,
    used: u32,
    last: u64,
}

impl<G: Generator> Persistent<G> {
    /// Wraps `inner`, starting out with one of its existing IDs.
    pub fn new(mut inner: G, hold: u32) -> Self {
        let last = inner.get_existing();
        Self {
            inner,
            hold,
            used: 0,
            last,
        }
    }

    /// Returns the wrapped generator.
    pub fn into_inner(self) -> G {
        self.inner
    }
}

impl<G: Generator> Generator for Persistent<G> {
    fn get_new(&mut self) -> u64 {
        self.last = self.inner.get_new();
        self.used = 0;
        self.last
    }

    fn get_existing(&mut self) -> u64 {
        if self.used == self.hold {
            self.used = 0;
            self.last = self.inner.get_existing();
            return self.last;
        }

        self.used += 1;
        self.last
    }
}

/// Creates [`Persistent`] generators wrapping generators of another source.
///
/// Every generator has its own hold counter, only the state of the inner source is shared.
#[derive(Clone, Debug)]
pub struct PersistentSource {
    inner: Box<IdSource>,
    hold: u32,
}

impl PersistentSource {
    /// Creates a source holding each ID of `inner` for `hold` calls.
    pub fn new(inner: impl Into<IdSource>, hold: u32) -> Self {
        Self {
            inner: Box::new(inner.into()),
            hold,
        }
    }

    /// Returns a generator wrapping a new generator of the inner source.
    pub fn new_generator(&self) -> Persistent {
        Persistent::new(self.inner.new_generator(), self.hold)
    }
}
