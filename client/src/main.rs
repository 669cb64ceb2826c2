//! Interactive client shell (spec §4.5): a blocking read-eval-print loop
//! driving an async `Session` via `block_on`.

use std::io::Write;

use async_std::task;
use clap::Parser;
use client::Session;
use common::errors::*;
use log::info;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "KVS_MANAGER_ADDR", default_value = "localhost:7000")]
    manager: String,
}

fn main() -> Result<()> {
    env_logger::init();
    task::block_on(run())
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let mut session = match Session::connect(&args.manager).await {
        Ok(session) => session,
        Err(e) => {
            println!("连接管理服务器时发生错误: {}", e);
            return Ok(());
        }
    };
    println!("已连接至管理服务器, 客户端ID为 {}", session.client_id);
    println!("连接至存储服务器 {}", session.storage_addr);

    // The shell loop below blocks on stdin, so SIGINT/SIGTERM cannot
    // interrupt it; the handler notifies the Manager itself and exits
    // directly, mirroring the original client's signal handler.
    let manager_addr = args.manager.clone();
    let client_id = session.client_id;
    ctrlc::set_handler(move || {
        println!("接收到中断信号，正在退出...");
        task::block_on(async {
            let request = rpc::proto::ManagerRequest::Disconnect { client_id };
            let _: std::result::Result<rpc::proto::ManagerResponse, _> =
                rpc::call(&manager_addr, &request, rpc::DEFAULT_DEADLINE).await;
        });
        std::process::exit(0);
    })
    .map_err(|e| format_err!("failed to register signal handler: {}", e))?;

    println!("开始输入命令");
    loop {
        print!(">>> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line() else {
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_uppercase();

        match cmd.as_str() {
            "EXIT" => break,
            "HELP" => print_help(),
            "GET" => {
                if parts.len() != 2 {
                    println!("不正确的参数个数");
                    continue;
                }
                match session.get(parts[1].to_string()).await {
                    Ok(Ok(value)) => println!("{}", String::from_utf8_lossy(&value)),
                    Ok(Err(e)) => println!("{}", e),
                    Err(e) => println!("发生错误: {}", e),
                }
            }
            "PUT" => {
                if parts.len() != 3 {
                    println!("不正确的参数个数");
                    continue;
                }
                match session.put(parts[1].to_string(), parts[2].as_bytes().to_vec()).await {
                    Ok(Ok(())) => println!("上传成功"),
                    Ok(Err(e)) => println!("{}", e),
                    Err(e) => println!("发生错误: {}", e),
                }
            }
            "DEL" => {
                if parts.len() != 2 {
                    println!("不正确的参数个数");
                    continue;
                }
                match session.del(parts[1].to_string()).await {
                    Ok(Ok(())) => println!("删除成功"),
                    Ok(Err(e)) => println!("{}", e),
                    Err(e) => println!("发生错误: {}", e),
                }
            }
            "CHANGE" => {
                let result = match parts.len() {
                    1 => session.change_server_random().await,
                    2 => session.change_server(parts[1].to_string()).await,
                    _ => {
                        println!("不正确的参数个数");
                        continue;
                    }
                };
                match result {
                    Ok(()) => println!("切换成功"),
                    Err(e) => println!("{}", e),
                }
            }
            _ => println!("无效命令"),
        }
    }

    session.disconnect().await;
    info!("client {} disconnected", session.client_id);
    println!("结束");
    Ok(())
}

fn print_help() {
    println!("使用 get [key] 来获取key对应的键值");
    println!("使用 put [key] [value] 来上传键值对");
    println!("使用 del [key] 来删除key对应的键值");
    println!("使用 change <api> 更改存储服务器, 不指定api时随机分配");
    println!("使用 exit 结束运行");
}

fn read_line() -> Option<String> {
    let mut buf = String::new();
    match std::io::stdin().read_line(&mut buf) {
        Ok(0) => None,
        Ok(_) => Some(buf),
        Err(_) => None,
    }
}
