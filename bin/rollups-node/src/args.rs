use std::path::PathBuf;

use argh::FromArgs;

use rollups_config::Config;

#[derive(Debug, Clone, FromArgs)]
#[argh(description = "Rollups dual-source ingestion node")]
pub struct Args {
    #[argh(option, short = 'c', description = "path to configuration")]
    pub config: PathBuf,

    // Config overriding args
    #[argh(
        option,
        short = 'd',
        description = "datadir path that will contain the database"
    )]
    pub datadir: Option<PathBuf>,

    #[argh(option, description = "inspect endpoint host")]
    pub inspect_host: Option<String>,

    #[argh(option, description = "inspect endpoint port")]
    pub inspect_port: Option<u16>,
}

impl Args {
    pub fn override_config(&self, config: &mut Config) {
        if let Some(datadir) = &self.datadir {
            config.node.datadir = datadir.clone();
        }
        if let Some(host) = &self.inspect_host {
            config.inspect.host = host.clone();
        }
        if let Some(port) = self.inspect_port {
            config.inspect.port = port;
        }
    }
}
