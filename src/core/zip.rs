//! Lock-step iteration over several sorted record streams
//!
//! Every stream must be ordered by [`CompositeKey`] (nodes, then ways, then
//! relations, each by ascending id). Each step yields one tuple holding the
//! record of every stream that has the smallest current key and `None` for
//! the others, which makes comparing versions of the same data set a single
//! merge pass.

use butterfly_common::{CompositeKey, Element, Result};

use crate::core::processor::{Records, StreamProcessor};

struct Cursor<I> {
    iter: I,
    current: Option<Element>,
    key: CompositeKey,
}

impl<I> Cursor<I>
where
    I: Iterator<Item = Result<Element>>,
{
    fn new(iter: I) -> Self {
        Cursor {
            iter,
            current: None,
            key: CompositeKey::SENTINEL,
        }
    }

    /// Move to the next record; parks on the sentinel at end of stream
    fn advance(&mut self) -> Result<()> {
        match self.iter.next().transpose()? {
            Some(element) => {
                self.key = element.key();
                self.current = Some(element);
            }
            None => {
                self.key = CompositeKey::SENTINEL;
                self.current = None;
            }
        }
        Ok(())
    }
}

/// Synchronizer over N sorted streams.
///
/// Cursors that contributed to a tuple are advanced when the next tuple is
/// requested, so a read error never discards records already returned.
pub struct ZipStreams<I> {
    cursors: Vec<Cursor<I>>,
    /// Cursors to advance before computing the next minimum
    pending: Vec<usize>,
    done: bool,
}

impl<I> ZipStreams<I>
where
    I: Iterator<Item = Result<Element>>,
{
    pub fn new<S>(streams: impl IntoIterator<Item = S>) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        let cursors: Vec<Cursor<I>> = streams
            .into_iter()
            .map(|s| Cursor::new(s.into_iter()))
            .collect();
        ZipStreams {
            pending: (0..cursors.len()).collect(),
            cursors,
            done: false,
        }
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    fn step(&mut self) -> Result<Option<Vec<Option<Element>>>> {
        for index in std::mem::take(&mut self.pending) {
            self.cursors[index].advance()?;
        }

        let min = self
            .cursors
            .iter()
            .map(|c| c.key)
            .min()
            .unwrap_or(CompositeKey::SENTINEL);
        if min.is_sentinel() {
            return Ok(None);
        }

        let mut tuple = Vec::with_capacity(self.cursors.len());
        for (index, cursor) in self.cursors.iter_mut().enumerate() {
            if cursor.key == min {
                tuple.push(cursor.current.take());
                self.pending.push(index);
            } else {
                tuple.push(None);
            }
        }
        Ok(Some(tuple))
    }
}

impl<I> Iterator for ZipStreams<I>
where
    I: Iterator<Item = Result<Element>>,
{
    type Item = Result<Vec<Option<Element>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(tuple)) => Some(Ok(tuple)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<I> std::iter::FusedIterator for ZipStreams<I> where I: Iterator<Item = Result<Element>> {}

/// Zip fully configured processors; each one is iterated exactly once
pub fn zip_processors(
    processors: impl IntoIterator<Item = StreamProcessor>,
) -> ZipStreams<Records> {
    ZipStreams::new(processors)
}
