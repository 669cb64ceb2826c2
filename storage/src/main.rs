//! Storage node entrypoint: registers with the Manager, then serves
//! `StorageService` RPCs until it receives SIGINT/SIGTERM (spec §4.3).

use std::path::PathBuf;
use std::sync::Arc;

use async_std::task;
use clap::Parser;
use common::errors::*;
use log::info;
use rand::Rng;
use rpc::proto::StorageService;

use storage::StorageNode;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "localhost")]
    ip: String,

    /// Defaults to a random ephemeral port, matching the original's
    /// `random.randint(20000, 65535)` behavior.
    #[arg(long)]
    port: Option<u16>,

    #[arg(long, default_value_t = 5)]
    cache: usize,

    #[arg(long, default_value = "storage/")]
    savepath: String,

    /// Remove this node's data directory on shutdown.
    #[arg(long)]
    clear: bool,

    #[arg(long, env = "KVS_MANAGER_ADDR", default_value = "localhost:7000")]
    manager: String,
}

fn main() -> Result<()> {
    env_logger::init();
    task::block_on(run())
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let port = args.port.unwrap_or_else(|| rand::thread_rng().gen_range(20000..=65535));

    let server_id = StorageNode::register_with_manager(&args.manager, &args.ip, port)
        .await
        .map_err(|e| format_err!("无法连接管理服务器: {}", e))?;

    let data_dir = PathBuf::from(&args.savepath).join(format!("storage_{}", server_id));
    async_std::fs::create_dir_all(&data_dir).await?;

    let node = Arc::new(StorageNode::new(
        server_id,
        data_dir.clone(),
        args.manager.clone(),
        args.cache,
    ));

    let bind_addr = format!("{}:{}", args.ip, port);
    let dispatch_node = node.clone();
    let dispatcher = rpc::make_dispatcher(move |bytes| {
        let node = dispatch_node.clone();
        async move {
            let response = match bincode::deserialize(&bytes) {
                Ok(request) => node.dispatch(request).await,
                Err(e) => {
                    rpc::log_decode_error("storage", &e);
                    rpc::proto::StorageResponse::Live(Err("malformed request".to_string()))
                }
            };
            bincode::serialize(&response).unwrap_or_default()
        }
    });

    let server = rpc::Server::bind(&bind_addr, dispatcher).await?;
    info!("storage node {} listening on {}", server_id, bind_addr);

    let shutdown_node = node.clone();
    let clear_on_exit = args.clear;
    let (shutdown_tx, shutdown_rx) = async_std::channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| format_err!("failed to register signal handler: {}", e))?;

    task::spawn(async move {
        let _ = shutdown_rx.recv().await;
        info!("接收到中断信号, 正在注销...");
        shutdown_node.deregister_from_manager().await;
        if clear_on_exit {
            shutdown_node.clear_data_dir().await;
        }
        std::process::exit(0);
    });

    server.run().await
}
