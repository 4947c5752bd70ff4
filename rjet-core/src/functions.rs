//! Stateless processors for simple pipeline stages

use crate::element::Record;
use crate::error::Result;
use crate::processor::{Outbox, Processor};

/// Swallows its input and completes right away
pub fn noop() -> Box<dyn Processor> {
    Box::new(NoopProcessor {})
}

pub fn map<F>(f: F) -> Box<dyn Processor>
where
    F: Fn(Record) -> Result<Record> + Send + 'static,
{
    Box::new(MapProcessor { f })
}

pub fn filter<F>(f: F) -> Box<dyn Processor>
where
    F: Fn(&Record) -> bool + Send + 'static,
{
    Box::new(FilterProcessor { f })
}

struct NoopProcessor {}

impl Processor for NoopProcessor {}

struct MapProcessor<F> {
    f: F,
}

impl<F> Processor for MapProcessor<F>
where
    F: Fn(Record) -> Result<Record> + Send,
{
    fn process(&mut self, _ordinal: usize, record: Record, outbox: &mut Outbox) -> Result<()> {
        let record = (self.f)(record)?;
        outbox.emit(record);
        Ok(())
    }
}

struct FilterProcessor<F> {
    f: F,
}

impl<F> Processor for FilterProcessor<F>
where
    F: Fn(&Record) -> bool + Send,
{
    fn process(&mut self, _ordinal: usize, record: Record, outbox: &mut Outbox) -> Result<()> {
        if (self.f)(&record) {
            outbox.emit(record);
        }
        Ok(())
    }
}
