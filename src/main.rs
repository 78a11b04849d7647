//! # slabqe - 表面模型与 Quantum ESPRESSO 表面能工具
//!
//! 从体相结构切出表面模型，生成 pw.x 输入，读取 pw.x 输出并计算表面能。
//! 所有状态保存在一个 JSON 会话文件中。
//!
//! ## 子命令
//! - `load-bulk` / `build-slab` / `export-slab` - 结构
//! - `configure` / `show` - 会话参数
//! - `generate` - pw.x 输入文件（含赝势查找与复制）
//! - `parse-output` / `load-output` / `surface-energy` / `scan` - 能量
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── parsers/   (结构文件与 pw.x 输出解析)
//!   │     ├── slab/      (表面模型构建)
//!   │     ├── pseudo/    (赝势查找与复制)
//!   │     ├── qe/        (pw.x 输入生成)
//!   │     ├── batch/     (文件收集)
//!   │     └── models/    (数据模型与会话)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod error;
mod models;
mod parsers;
mod pseudo;
mod qe;
mod slab;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&e.to_string());
        if let Some(source) = std::error::Error::source(&e) {
            utils::output::print_error(&format!("Caused by: {}", source));
        }
        std::process::exit(1);
    }
}
