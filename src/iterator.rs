use crate::db::Engine;
use crate::error::Result;
use crate::index::IndexIterator;
use crate::options::IteratorOptions;

/// Iterates the live key set in prefix- and direction-filtered order.
/// Wraps the index's own iterator and adds the prefix filter; reading a
/// value re-reads the record from its data file on demand.
pub struct EngineIterator<'a> {
    index_iter: Box<dyn IndexIterator>,
    engine: &'a Engine,
    options: IteratorOptions,
}

impl<'a> EngineIterator<'a> {
    pub(crate) fn new(engine: &'a Engine, options: IteratorOptions) -> Self {
        let mut index_iter = engine.index.iterator(options.reverse);
        index_iter.rewind();
        let mut iter = EngineIterator { index_iter, engine, options };
        iter.skip_to_next();
        iter
    }

    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_next();
    }

    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
    }

    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_next();
    }

    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    pub fn key(&self) -> &[u8] {
        self.index_iter.key()
    }

    pub fn value(&self) -> Result<Vec<u8>> {
        let pos = self.index_iter.value();
        let state = self.engine.state.read();
        self.engine.get_value_by_position(&state, pos)
    }

    /// Advances past any keys that don't match the configured prefix.
    fn skip_to_next(&mut self) {
        if self.options.prefix.is_empty() {
            return;
        }
        while self.index_iter.valid() {
            let key = self.index_iter.key();
            if key.len() >= self.options.prefix.len() && &key[..self.options.prefix.len()] == self.options.prefix.as_slice() {
                return;
            }
            self.index_iter.next();
        }
    }
}
