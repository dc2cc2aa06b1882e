use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::*;
use tracing_subscriber::EnvFilter;

use rollups_chainio::EthChainClient;
use rollups_config::{load_config, Config, MachineMode};
use rollups_espresso_reader::client::HttpEspressoClient;
use rollups_espresso_reader::{EspressoReader, EspressoReaderConfig};
use rollups_evm_reader::EvmReader;
use rollups_inspect as inspect;
use rollups_machine::test_utils::EchoMachineFactory;
use rollups_machine::MachineRegistry;
use rollups_rocksdb::{open_rocksdb_database, NodeDb};
use rollups_storage::NodeStorage;
use rollups_tasks::{Readiness, TaskExecutor, TaskManager};

use crate::args::Args;

mod args;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e:#}");
        return Err(e);
    }
    Ok(())
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    // Start runtime for async IO tasks.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("rollups-rt")
        .build()
        .expect("init: build rt");

    init_logging();

    let mut config = load_config(&args.config)?;
    args.override_config(&mut config);

    info!("starting the rollups node");

    // Open the database and build the storage layer everything shares.
    let rbdb = open_rocksdb_database(&config.node.datadir)?;
    let pool = threadpool::Builder::new()
        .num_threads(config.node.db_worker_threads)
        .thread_name("rollups-db".to_owned())
        .build();
    let storage = NodeStorage::new(pool, Arc::new(NodeDb::new(rbdb)));

    let task_manager = TaskManager::new(runtime.handle().clone());
    let executor = task_manager.executor();
    let mut readiness = Readiness::new();

    runtime.block_on(start_services(
        &executor,
        &mut readiness,
        &config,
        storage,
    ))?;

    executor.spawn_critical("readiness", |_| async move {
        readiness.wait_all().await;
        Ok(())
    });

    task_manager.start_signal_listener();
    task_manager.monitor(SHUTDOWN_TIMEOUT)?;

    info!("exiting");
    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn start_services(
    executor: &TaskExecutor,
    readiness: &mut Readiness,
    config: &Config,
    storage: NodeStorage,
) -> anyhow::Result<()> {
    let chain_client = Arc::new(
        EthChainClient::new(
            &config.chain.http_url,
            &config.chain.ws_url,
            config.chain.input_box,
        )
        .await?,
    );
    let espresso_client = Arc::new(HttpEspressoClient::new(&config.espresso.base_url));

    // Machine registry + inspect endpoint.
    let apps = storage.get_all_running_applications().await?;
    let registry = match config.machine.mode {
        MachineMode::Echo => {
            Arc::new(MachineRegistry::load(&apps, &EchoMachineFactory).await?)
        }
    };
    info!(applications = registry.len(), "machine registry loaded");

    let inspect_addr: SocketAddr =
        format!("{}:{}", config.inspect.host, config.inspect.port).parse()?;
    let inspect_ready = readiness.register("inspect");
    executor.spawn_critical("inspect", move |shutdown| {
        inspect::serve(inspect_addr, registry, shutdown, inspect_ready)
    });

    // Base-chain reader, driven by the new-heads subscription.
    let evm_reader = EvmReader::new(
        chain_client.clone(),
        storage.clone(),
        config.chain.default_block,
    );
    let evm_ready = readiness.register("evm-reader");
    executor.spawn_critical("evm-reader", move |shutdown| {
        evm_reader.run(shutdown, evm_ready)
    });

    // Espresso reader, holding its own reader value for the L1 read path;
    // the two share nothing but the repository.
    let espresso_evm_reader = EvmReader::new(
        chain_client,
        storage.clone(),
        config.chain.default_block,
    );
    let espresso_reader = EspressoReader::new(
        espresso_client,
        espresso_evm_reader,
        storage,
        EspressoReaderConfig {
            namespace: config.espresso.namespace,
            starting_block: config.espresso.starting_block,
            chain_id: config.chain.chain_id,
            input_box_deployment_block: config.chain.input_box_deployment_block,
        },
    );
    let espresso_ready = readiness.register("espresso-reader");
    executor.spawn_critical("espresso-reader", move |shutdown| {
        espresso_reader.run(shutdown, espresso_ready)
    });

    Ok(())
}
