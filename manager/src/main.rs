//! Manager entrypoint: serves `ManagerService` RPCs and runs the
//! background heartbeat loop until SIGINT/SIGTERM (spec §4.4).

use std::sync::Arc;
use std::time::Duration;

use async_std::task;
use clap::Parser;
use common::errors::*;
use log::info;
use rpc::proto::ManagerService;

use manager::{heartbeat, Manager, Registry};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = 7000)]
    port: u16,

    #[arg(long, default_value_t = 10)]
    heartbeat_interval: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    task::block_on(run())
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let registry = Arc::new(Registry::new());
    let manager = Arc::new(Manager::new(registry.clone()));

    let _heartbeat = heartbeat::spawn(registry.clone(), Duration::from_secs(args.heartbeat_interval));

    let bind_addr = format!("{}:{}", args.host, args.port);
    let dispatch_manager = manager.clone();
    let dispatcher = rpc::make_dispatcher(move |bytes| {
        let manager = dispatch_manager.clone();
        async move {
            let response = match bincode::deserialize(&bytes) {
                Ok(request) => manager.dispatch(request).await,
                Err(e) => {
                    rpc::log_decode_error("manager", &e);
                    rpc::proto::ManagerResponse::Disconnect(Err("malformed request".to_string()))
                }
            };
            bincode::serialize(&response).unwrap_or_default()
        }
    });

    let server = rpc::Server::bind(&bind_addr, dispatcher).await?;
    info!("manager listening on {}", bind_addr);

    let (shutdown_tx, shutdown_rx) = async_std::channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| format_err!("failed to register signal handler: {}", e))?;

    task::spawn(async move {
        let _ = shutdown_rx.recv().await;
        info!("接收到中断信号, 退出服务");
        std::process::exit(0);
    });

    server.run().await
}
