use std::convert::TryFrom;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::error::{JetError, Result};
use crate::properties::Properties;

pub const SECONDS_TO_AWAIT: &str = "seconds_to_await";
pub const LOCAL_PARALLELISM: &str = "local_parallelism";
pub const NETWORK_THREADS: &str = "network_threads";
pub const PROCESSING_THREADS: &str = "processing_threads";
pub const POOL_CAPACITY: &str = "pool_capacity";
pub const QUEUE_SIZE: &str = "queue_size";
pub const CLUSTER: &str = "cluster";
pub const CLIENT_PREFIX: &str = "client";

const DEFAULT_SECONDS_TO_AWAIT: u64 = 10;
const DEFAULT_NETWORK_THREADS: usize = 2;
const DEFAULT_POOL_CAPACITY: usize = 4096;
const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Connection settings of a remote cluster reached through a client
#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default)]
pub struct ClientConfig {
    pub cluster_name: String,
    pub addresses: Vec<String>,
}

impl ClientConfig {
    pub fn new(cluster_name: &str) -> Self {
        ClientConfig {
            cluster_name: cluster_name.to_string(),
            addresses: Vec::new(),
        }
    }

    pub fn add_address(mut self, address: &str) -> Self {
        self.addresses.push(address.to_string());
        self
    }

    fn from_properties(properties: &Properties) -> Result<Self> {
        let cluster_name = properties
            .get_string("cluster_name")
            .unwrap_or("dev".to_string());
        let addresses: Vec<String> = properties
            .get_string("addresses")?
            .split(',')
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .collect();
        if addresses.is_empty() {
            return Err(JetError::Config(
                "`client.addresses` must name at least one address".to_string(),
            ));
        }

        Ok(ClientConfig {
            cluster_name,
            addresses,
        })
    }
}

impl std::fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@[{}]", self.cluster_name, self.addresses.join(","))
    }
}

/// Which cluster a job's partitioned connectors talk to by default
#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
pub enum ClusterTarget {
    Local,
    Client(ClientConfig),
}

impl Default for ClusterTarget {
    fn default() -> Self {
        ClusterTarget::Local
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct JobConfig {
    /// bound of every synchronous container request
    pub seconds_to_await: u64,
    /// instance count of vertices that don't declare one
    pub local_parallelism: u32,
    pub network_threads: usize,
    pub processing_threads: usize,
    /// max tasks admitted to one pool at a time
    pub pool_capacity: usize,
    /// capacity of every bounded edge queue
    pub queue_size: usize,
    pub cluster: ClusterTarget,
}

impl Default for JobConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        JobConfig {
            seconds_to_await: DEFAULT_SECONDS_TO_AWAIT,
            local_parallelism: cpus as u32,
            network_threads: DEFAULT_NETWORK_THREADS,
            processing_threads: cpus,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            queue_size: DEFAULT_QUEUE_SIZE,
            cluster: ClusterTarget::Local,
        }
    }
}

impl JobConfig {
    pub fn new() -> Self {
        JobConfig::default()
    }

    pub fn seconds_to_await(mut self, seconds: u64) -> Self {
        self.seconds_to_await = seconds;
        self
    }

    pub fn local_parallelism(mut self, parallelism: u32) -> Self {
        self.local_parallelism = parallelism;
        self
    }

    pub fn cluster(mut self, cluster: ClusterTarget) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn await_timeout(&self) -> Duration {
        Duration::from_secs(self.seconds_to_await)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            (SECONDS_TO_AWAIT, self.seconds_to_await as usize),
            (LOCAL_PARALLELISM, self.local_parallelism as usize),
            (NETWORK_THREADS, self.network_threads),
            (PROCESSING_THREADS, self.processing_threads),
            (POOL_CAPACITY, self.pool_capacity),
            (QUEUE_SIZE, self.queue_size),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(JetError::Config(format!("`{}` must be positive", key)));
            }
        }
        Ok(())
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<JobConfig> {
        let mut file = File::open(path)?;
        let mut buffer = String::new();
        file.read_to_string(&mut buffer)?;

        let properties = Properties::from_yaml_str(buffer.as_str())?;
        JobConfig::try_from(&properties)
    }
}

impl<'a> TryFrom<&'a Properties> for JobConfig {
    type Error = JetError;

    fn try_from(properties: &'a Properties) -> Result<Self> {
        let mut config = JobConfig::default();

        if properties.contains_key(SECONDS_TO_AWAIT) {
            config.seconds_to_await = properties.get_u64(SECONDS_TO_AWAIT)?;
        }
        if properties.contains_key(LOCAL_PARALLELISM) {
            config.local_parallelism = properties.get_u32(LOCAL_PARALLELISM)?;
        }
        if properties.contains_key(NETWORK_THREADS) {
            config.network_threads = properties.get_usize(NETWORK_THREADS)?;
        }
        if properties.contains_key(PROCESSING_THREADS) {
            config.processing_threads = properties.get_usize(PROCESSING_THREADS)?;
        }
        if properties.contains_key(POOL_CAPACITY) {
            config.pool_capacity = properties.get_usize(POOL_CAPACITY)?;
        }
        if properties.contains_key(QUEUE_SIZE) {
            config.queue_size = properties.get_usize(QUEUE_SIZE)?;
        }

        if properties.contains_key(CLUSTER) {
            let mode = properties.get_string(CLUSTER)?.to_ascii_lowercase();
            config.cluster = match mode.as_str() {
                "" | "local" => ClusterTarget::Local,
                "client" => {
                    let client_properties = properties.to_sub_properties(CLIENT_PREFIX);
                    ClusterTarget::Client(ClientConfig::from_properties(&client_properties)?)
                }
                _ => {
                    return Err(JetError::Config(format!(
                        "unsupported cluster mode `{}`",
                        mode
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}
