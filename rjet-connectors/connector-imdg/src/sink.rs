use std::sync::Arc;

use serde_json::{json, Value};

use rjet_core::element::Record;
use rjet_core::grid::GridList;
use rjet_core::processor::{Outbox, Processor, ProcessorContext, ProcessorSupplier, SupplierContext};
use rjet_core::Result;

const FLUSH_SIZE: usize = 1024;

/// Appends every received record to the list `name` of the local grid.
///
/// A keyed record is stored as the array `[key, value]`, any other record as
/// its value.
pub fn write_list(name: &str) -> ListSink {
    ListSink {
        name: name.to_string(),
    }
}

pub struct ListSink {
    name: String,
}

impl ProcessorSupplier for ListSink {
    fn get(&self, context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>> {
        let list = context.grid().list(self.name.as_str());
        let processors = (0..count)
            .map(|_| {
                let processor: Box<dyn Processor> = Box::new(ListWriter {
                    list: list.clone(),
                    buffer: Vec::new(),
                    written: 0,
                });
                processor
            })
            .collect();
        Ok(processors)
    }
}

struct ListWriter {
    list: Arc<dyn GridList>,
    buffer: Vec<Value>,
    written: usize,
}

impl ListWriter {
    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let items = std::mem::take(&mut self.buffer);
        self.written += items.len();
        self.list.add_all(items)
    }
}

impl Processor for ListWriter {
    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        debug!(
            "`{}`#{} writes to list `{}`",
            context.vertex_name,
            context.local_index,
            self.list.name()
        );
        Ok(())
    }

    fn process(&mut self, _ordinal: usize, record: Record, _outbox: &mut Outbox) -> Result<()> {
        let item = match record.key {
            Some(key) => json!([key, record.value]),
            None => record.value,
        };
        self.buffer.push(item);
        if self.buffer.len() >= FLUSH_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    fn complete(&mut self, _outbox: &mut Outbox) -> Result<bool> {
        self.flush()?;
        debug!("{} items written to list `{}`", self.written, self.list.name());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use rjet_core::element::Record;
    use rjet_core::grid::{DataGrid, NoClientFactory};
    use rjet_core::processor::{Outbox, ProcessorSupplier, SupplierContext};
    use rjet_core::JobId;

    use crate::memory::MemoryDataGrid;
    use crate::sink::write_list;

    #[test]
    pub fn write_list_test() {
        let grid: Arc<dyn DataGrid> = Arc::new(MemoryDataGrid::new("m1", 4));
        let context = SupplierContext::new(JobId(1), "sink", 1, grid.clone(), Arc::new(NoClientFactory));
        let mut processors = write_list("out").get(&context, 1).unwrap();
        let processor = &mut processors[0];

        let mut outbox = Outbox::new(0, 16);
        processor
            .process(0, Record::entry("a", json!(1)), &mut outbox)
            .unwrap();
        processor
            .process(0, Record::text("line"), &mut outbox)
            .unwrap();
        assert_eq!(grid.list("out").len(), 0);

        assert!(processor.complete(&mut outbox).unwrap());
        assert_eq!(
            grid.list("out").items().unwrap(),
            vec![json!(["a", 1]), json!("line")]
        );
    }
}
