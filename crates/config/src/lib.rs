//! Node configuration, loaded from a TOML file with CLI overrides applied
//! on top by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rollups_primitives::{Buf20, DefaultBlock};

const DEFAULT_DATADIR: &str = "rollups-data";
const DEFAULT_INSPECT_HOST: &str = "127.0.0.1";
const DEFAULT_INSPECT_PORT: u16 = 10012;
const DEFAULT_DB_WORKER_THREADS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,

    #[serde(default = "default_db_worker_threads")]
    pub db_worker_threads: usize,
}

fn default_datadir() -> PathBuf {
    DEFAULT_DATADIR.into()
}

fn default_db_worker_threads() -> usize {
    DEFAULT_DB_WORKER_THREADS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
    pub http_url: String,
    pub ws_url: String,
    pub chain_id: u64,
    pub input_box: Buf20,
    pub input_box_deployment_block: u64,

    /// Which head counts as committed when scanning for inputs.
    #[serde(default)]
    pub default_block: DefaultBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EspressoConfig {
    pub base_url: String,
    pub namespace: u64,

    /// First sequencer block to scan when the database has no cursor yet;
    /// 0 means start from the sequencer's current height.
    #[serde(default)]
    pub starting_block: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InspectConfig {
    #[serde(default = "default_inspect_host")]
    pub host: String,

    #[serde(default = "default_inspect_port")]
    pub port: u16,
}

fn default_inspect_host() -> String {
    DEFAULT_INSPECT_HOST.to_string()
}

fn default_inspect_port() -> u16 {
    DEFAULT_INSPECT_PORT
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            host: default_inspect_host(),
            port: default_inspect_port(),
        }
    }
}

/// Which machine backend the registry loads. Real VM backends implement
/// the machine factory trait; `echo` is the built-in loopback.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MachineMode {
    #[default]
    Echo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MachineConfig {
    #[serde(default)]
    pub mode: MachineMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub node: NodeConfig,
    pub chain: ChainConfig,
    pub espresso: EspressoConfig,

    #[serde(default)]
    pub inspect: InspectConfig,

    #[serde(default)]
    pub machine: MachineConfig,
}

/// Reads and parses the config file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("could not read config {}: {e}", path.display()))?;
    Ok(toml::from_str(&raw)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_load() {
        let config_string = r#"
            [node]
            datadir = "/var/lib/rollups"
            db_worker_threads = 8

            [chain]
            http_url = "http://localhost:8545"
            ws_url = "ws://localhost:8546"
            chain_id = 31337
            input_box = "0x58c93f83fb3304730c95aad2e360cdb88b782010"
            input_box_deployment_block = 20
            default_block = "finalized"

            [espresso]
            base_url = "https://query.main.net.espresso.network/v0"
            namespace = 55555
            starting_block = 100

            [inspect]
            host = "0.0.0.0"
            port = 10012
        "#;

        let config = toml::from_str::<Config>(config_string).expect("config should parse");
        assert_eq!(config.chain.default_block, DefaultBlock::Finalized);
        assert_eq!(config.espresso.namespace, 55555);
        assert_eq!(config.machine.mode, MachineMode::Echo);
    }

    #[test]
    fn test_defaults_fill_in() {
        let config_string = r#"
            [node]

            [chain]
            http_url = "http://localhost:8545"
            ws_url = "ws://localhost:8546"
            chain_id = 1
            input_box = "0x58c93f83fb3304730c95aad2e360cdb88b782010"
            input_box_deployment_block = 0

            [espresso]
            base_url = "http://localhost:21000"
            namespace = 1
        "#;

        let config = toml::from_str::<Config>(config_string).expect("config should parse");
        assert_eq!(config.node.datadir, PathBuf::from(DEFAULT_DATADIR));
        assert_eq!(config.inspect.port, DEFAULT_INSPECT_PORT);
        assert_eq!(config.espresso.starting_block, 0);
        assert_eq!(config.chain.default_block, DefaultBlock::Finalized);
    }
}
