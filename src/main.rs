//! Watchdog 主程序入口
//!
//! 配置错误以退出码 2 结束，其他错误以退出码 1 结束

use clap::Parser;
use tracing::error;
use watchdog::cli::{command_for, setup_logging, Args, Commands, EXIT_CONFIG_ERROR, EXIT_FAILURE};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let command = args.command();

    // run 命令在加载配置后才初始化日志，以便使用配置文件中的日志设置
    if command != Commands::Run {
        if let Err(e) = setup_logging(&args, None) {
            eprintln!("{:#}", e);
            std::process::exit(EXIT_FAILURE);
        }
    }

    let code = match command_for(&command).execute(&args).await {
        Ok(code) => code,
        Err(e) if e.is_fatal() => {
            eprintln!("{}", e);
            error!("{}", e);
            EXIT_CONFIG_ERROR
        }
        Err(e) => {
            eprintln!("命令执行失败: {}", e);
            error!("命令执行失败: {}", e);
            EXIT_FAILURE
        }
    };

    std::process::exit(code);
}
