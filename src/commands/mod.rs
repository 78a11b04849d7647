//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。会话命令统一遵循：加载 → 计算新会话 → 成功后写回。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `parsers/`, `models/`, `pseudo/`, `qe/`, `utils/`
//! - 子模块: slab, session, input, energy, scan

pub mod energy;
pub mod input;
pub mod scan;
pub mod session;
pub mod slab;

use crate::cli::{Commands, SessionArgs};
use crate::error::{Result, SlabQeError};
use crate::models::Session;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::LoadBulk(args) => slab::load_bulk(args),
        Commands::BuildSlab(args) => slab::build_slab(args),
        Commands::ExportSlab(args) => slab::export_slab(args),
        Commands::Configure(args) => session::configure(args),
        Commands::Show(args) => session::show(args),
        Commands::Generate(args) => input::execute(args),
        Commands::ParseOutput(args) => energy::parse_output(args),
        Commands::LoadOutput(args) => energy::load_output(args),
        Commands::SurfaceEnergy(args) => energy::surface_energy(args),
        Commands::Scan(args) => scan::execute(args),
    }
}

/// 加载已有会话文件；不存在时报错并提示 load-bulk
fn open_session(args: &SessionArgs) -> Result<Session> {
    if !args.path.is_file() {
        return Err(SlabQeError::FileNotFound {
            path: format!(
                "{} (create it with `slabqe load-bulk <STRUCTURE> -s {}`)",
                args.path.display(),
                args.path.display()
            ),
        });
    }
    Session::load(&args.path)
}
