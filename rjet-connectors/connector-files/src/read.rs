use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use rjet_core::element::Record;
use rjet_core::processor::{Outbox, Processor, ProcessorContext, ProcessorSupplier, SupplierContext};
use rjet_core::utils::charset::{check_charset, trim_line_end};
use rjet_core::Result;

use crate::list_files;

/// Emits the lines of every file in `directory` (not its sub directories)
/// whose name matches `glob`.
///
/// Files are dealt out to the local instances by their index in name order,
/// each file is read by exactly one instance. The files must not change
/// while they are read.
pub fn read_files(directory: &str, charset: &str, glob: &str) -> ReadFilesSource {
    ReadFilesSource {
        directory: PathBuf::from(directory),
        charset: charset.to_string(),
        glob: glob.to_string(),
    }
}

pub struct ReadFilesSource {
    directory: PathBuf,
    charset: String,
    glob: String,
}

impl ProcessorSupplier for ReadFilesSource {
    fn init(&self, _context: &SupplierContext) -> Result<()> {
        check_charset(self.charset.as_str())
    }

    fn get(&self, context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>> {
        let files = list_files(self.directory.as_path(), self.glob.as_str())?;
        info!(
            "`{}` reads {} files of {:?} with {} instances",
            context.vertex_name,
            files.len(),
            self.directory,
            count
        );

        let mut shares: Vec<VecDeque<PathBuf>> = (0..count).map(|_| VecDeque::new()).collect();
        for (i, file) in files.into_iter().enumerate() {
            shares[i % count].push_back(file);
        }

        let processors = shares
            .into_iter()
            .map(|files| {
                let processor: Box<dyn Processor> = Box::new(ReadFilesProcessor {
                    files,
                    reader: None,
                    line: String::new(),
                });
                processor
            })
            .collect();
        Ok(processors)
    }
}

struct ReadFilesProcessor {
    files: VecDeque<PathBuf>,
    reader: Option<BufReader<File>>,
    line: String,
}

impl Processor for ReadFilesProcessor {
    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        debug!(
            "`{}`#{} reads {:?}",
            context.vertex_name, context.local_index, self.files
        );
        Ok(())
    }

    fn complete(&mut self, outbox: &mut Outbox) -> Result<bool> {
        while !outbox.is_full() {
            if self.reader.is_none() {
                match self.files.pop_front() {
                    Some(path) => {
                        debug!("reading {:?}", path);
                        self.reader = Some(BufReader::new(File::open(path)?));
                    }
                    None => return Ok(true),
                }
            }
            let reader = match self.reader.as_mut() {
                Some(reader) => reader,
                None => continue,
            };

            self.line.clear();
            if reader.read_line(&mut self.line)? == 0 {
                self.reader = None;
                continue;
            }
            trim_line_end(&mut self.line);
            outbox.emit(Record::text(self.line.as_str()));
        }
        Ok(false)
    }
}
