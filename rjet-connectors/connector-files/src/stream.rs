//! A source following the files of a watched directory.
//!
//! Every poll lists the directory and reads what was appended to each file
//! since the last poll. Only complete lines are emitted; a trailing line
//! without its newline waits for the next poll. Pre-existing files are
//! followed from the size they had when the job started, new files from
//! their start. The source completes once the directory is deleted.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rjet_core::element::Record;
use rjet_core::processor::{Outbox, Processor, ProcessorContext, ProcessorSupplier, SupplierContext};
use rjet_core::utils::charset::{check_charset, trim_line_end};
use rjet_core::utils::hash::bucket_of;
use rjet_core::{JetError, Result};

use crate::list_files;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn stream_files(directory: &str, charset: &str, glob: &str) -> StreamFilesSource {
    StreamFilesSource {
        directory: PathBuf::from(directory),
        charset: charset.to_string(),
        glob: glob.to_string(),
    }
}

pub struct StreamFilesSource {
    directory: PathBuf,
    charset: String,
    glob: String,
}

impl ProcessorSupplier for StreamFilesSource {
    fn init(&self, _context: &SupplierContext) -> Result<()> {
        check_charset(self.charset.as_str())
    }

    fn get(&self, _context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>> {
        let processors = (0..count)
            .map(|_| {
                let processor: Box<dyn Processor> = Box::new(StreamFilesProcessor {
                    directory: self.directory.clone(),
                    glob: self.glob.clone(),
                    local_index: 0,
                    local_parallelism: count,
                    cursors: HashMap::new(),
                    pending: VecDeque::new(),
                    last_poll: None,
                });
                processor
            })
            .collect();
        Ok(processors)
    }
}

/// How far one file was read
#[derive(Clone, Debug, Default, PartialEq)]
struct FileCursor {
    offset: u64,
    /// the offset is inside a line written by someone else, skip to its end
    skip_partial: bool,
}

struct StreamFilesProcessor {
    directory: PathBuf,
    glob: String,
    local_index: usize,
    local_parallelism: usize,
    cursors: HashMap<PathBuf, FileCursor>,
    pending: VecDeque<Record>,
    last_poll: Option<Instant>,
}

impl StreamFilesProcessor {
    /// A file is followed by the instance its name hashes to, so files
    /// created later land on exactly one instance too.
    fn owns(&self, path: &Path) -> bool {
        match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => bucket_of(name.as_bytes(), self.local_parallelism) == self.local_index,
            None => false,
        }
    }

    fn owned_files(&self) -> Result<Vec<PathBuf>> {
        let files = list_files(self.directory.as_path(), self.glob.as_str())?;
        Ok(files.into_iter().filter(|path| self.owns(path)).collect())
    }

    /// Returns `false` once the directory is gone
    fn poll(&mut self) -> Result<bool> {
        let files = match self.owned_files() {
            Ok(files) => files,
            Err(JetError::Io {
                kind: ErrorKind::NotFound,
                ..
            }) if !self.directory.is_dir() => {
                info!("watched directory {:?} deleted", self.directory);
                return Ok(false);
            }
            // a file vanished while listing
            Err(JetError::Io {
                kind: ErrorKind::NotFound,
                ..
            }) => return Ok(true),
            Err(e) => return Err(e),
        };

        self.cursors.retain(|path, _| files.contains(path));
        for path in files {
            let cursor = self.cursors.entry(path.clone()).or_default();
            match read_appended(path.as_path(), cursor) {
                Ok(lines) => self.pending.extend(lines.into_iter().map(Record::from)),
                // deleted between listing and reading
                Err(JetError::Io {
                    kind: ErrorKind::NotFound,
                    ..
                }) => {
                    self.cursors.remove(&path);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

impl Processor for StreamFilesProcessor {
    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        self.local_index = context.local_index;

        for path in self.owned_files()? {
            let cursor = start_cursor(path.as_path())?;
            debug!("{:?} followed from offset {}", path, cursor.offset);
            self.cursors.insert(path, cursor);
        }
        info!(
            "`{}`#{} watches {:?}, {} files present",
            context.vertex_name,
            context.local_index,
            self.directory,
            self.cursors.len()
        );
        Ok(())
    }

    fn complete(&mut self, outbox: &mut Outbox) -> Result<bool> {
        while !outbox.is_full() {
            match self.pending.pop_front() {
                Some(record) => outbox.emit(record),
                None => break,
            }
        }
        if !self.pending.is_empty() {
            return Ok(false);
        }

        let due = self
            .last_poll
            .map(|last| last.elapsed() >= POLL_INTERVAL)
            .unwrap_or(true);
        if !due {
            return Ok(false);
        }
        self.last_poll = Some(Instant::now());

        let watching = self.poll()?;
        Ok(!watching && self.pending.is_empty())
    }
}

/// Cursor at the current end of a file that already exists
fn start_cursor(path: &Path) -> Result<FileCursor> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size == 0 {
        return Ok(FileCursor::default());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(size - 1))?;
    file.read_exact(&mut last)?;
    Ok(FileCursor {
        offset: size,
        skip_partial: last[0] != b'\n',
    })
}

/// Complete lines appended since `cursor`, which is moved past them
fn read_appended(path: &Path, cursor: &mut FileCursor) -> Result<Vec<String>> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size < cursor.offset {
        warn!("{:?} shrank to {} bytes, following from there", path, size);
        *cursor = FileCursor {
            offset: size,
            skip_partial: false,
        };
        return Ok(vec![]);
    }
    if size == cursor.offset {
        return Ok(vec![]);
    }

    let mut buffer = Vec::with_capacity((size - cursor.offset) as usize);
    file.seek(SeekFrom::Start(cursor.offset))?;
    file.take(size - cursor.offset).read_to_end(&mut buffer)?;

    let mut start = 0;
    if cursor.skip_partial {
        match buffer.iter().position(|b| *b == b'\n') {
            Some(newline) => {
                start = newline + 1;
                cursor.skip_partial = false;
            }
            None => {
                cursor.offset += buffer.len() as u64;
                return Ok(vec![]);
            }
        }
    }

    let end = match buffer[start..].iter().rposition(|b| *b == b'\n') {
        Some(newline) => start + newline + 1,
        None => start,
    };
    cursor.offset += end as u64;

    let text = String::from_utf8(buffer[start..end].to_vec()).map_err(|e| JetError::Io {
        kind: ErrorKind::InvalidData,
        message: format!("{:?} isn't valid UTF-8: {}", path, e),
    })?;
    Ok(text
        .split_inclusive('\n')
        .map(|line| {
            let mut line = line.to_string();
            trim_line_end(&mut line);
            line
        })
        .collect())
}
