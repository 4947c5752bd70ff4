//! Line oriented text source reading from a TCP server.
//!
//! Every instance opens its own connection, so a vertex with local
//! parallelism `n` on `m` members holds `n * m` connections and the server is
//! expected to balance between them. An instance completes when the server
//! closes its connection; it never reconnects.

#[macro_use]
extern crate log;

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::time::timeout;

use rjet_core::element::Record;
use rjet_core::processor::{Outbox, Processor, ProcessorContext, ProcessorSupplier, SupplierContext};
use rjet_core::utils::charset::{check_charset, trim_line_end};
use rjet_core::{JetError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// bound of one blocking read, the task yields after it
const READ_TIMEOUT: Duration = Duration::from_millis(10);

pub fn stream_socket(host: &str, port: u16, charset: &str) -> StreamSocketSource {
    StreamSocketSource {
        host: host.to_string(),
        port,
        charset: charset.to_string(),
    }
}

pub struct StreamSocketSource {
    host: String,
    port: u16,
    charset: String,
}

impl ProcessorSupplier for StreamSocketSource {
    fn init(&self, _context: &SupplierContext) -> Result<()> {
        check_charset(self.charset.as_str())
    }

    fn get(&self, _context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>> {
        let processors = (0..count)
            .map(|_| {
                let processor: Box<dyn Processor> = Box::new(StreamSocketProcessor {
                    host: self.host.clone(),
                    port: self.port,
                    connection: None,
                    line: Vec::new(),
                });
                processor
            })
            .collect();
        Ok(processors)
    }
}

struct Connection {
    runtime: Runtime,
    reader: BufReader<TcpStream>,
}

struct StreamSocketProcessor {
    host: String,
    port: u16,
    connection: Option<Connection>,
    /// keeps a partially read line between reads
    line: Vec<u8>,
}

fn async_runtime_single() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(JetError::from)
}

impl Processor for StreamSocketProcessor {
    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        let runtime = async_runtime_single()?;
        let address = format!("{}:{}", self.host, self.port);
        let stream = runtime
            .block_on(async { timeout(CONNECT_TIMEOUT, TcpStream::connect(address.as_str())).await })
            .map_err(|_| JetError::Timeout {
                what: format!("connection to {}", address),
                seconds: CONNECT_TIMEOUT.as_secs(),
            })??;

        info!(
            "`{}`#{} connected to {}",
            context.vertex_name, context.local_index, address
        );
        self.connection = Some(Connection {
            runtime,
            reader: BufReader::new(stream),
        });
        Ok(())
    }

    fn complete(&mut self, outbox: &mut Outbox) -> Result<bool> {
        let connection = match self.connection.as_mut() {
            Some(connection) => connection,
            None => return Ok(true),
        };

        while !outbox.is_full() {
            let reader = &mut connection.reader;
            let line = &mut self.line;
            // a read cut by the timeout keeps its bytes in `line`
            let read = connection
                .runtime
                .block_on(async { timeout(READ_TIMEOUT, reader.read_until(b'\n', line)).await });
            match read {
                // nothing arrived, let the task check for interruption
                Err(_elapsed) => return Ok(false),
                Ok(Ok(0)) => {
                    if !self.line.is_empty() {
                        outbox.emit(Record::from(take_line(&mut self.line)?));
                    }
                    info!("server {}:{} closed the connection", self.host, self.port);
                    self.connection = None;
                    return Ok(true);
                }
                Ok(Ok(_)) => outbox.emit(Record::from(take_line(&mut self.line)?)),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        Ok(false)
    }
}

fn take_line(buffer: &mut Vec<u8>) -> Result<String> {
    let mut line = String::from_utf8(std::mem::take(buffer)).map_err(|e| JetError::Io {
        kind: std::io::ErrorKind::InvalidData,
        message: format!("received text isn't valid UTF-8: {}", e),
    })?;
    trim_line_end(&mut line);
    Ok(line)
}
