//! # 终端输出工具
//!
//! 统一的带标签输出：`[OK]`, `[WARN]`, `[*]` 等。错误写到 stderr，其余写到 stdout。
//! 另有能量与表面能的固定格式行，保证各命令报告的单位和精度一致。
//!
//! ## 依赖关系
//! - 被所有 `commands/` 模块和 `main.rs` 使用
//! - 使用 `colored` crate

use colored::{ColoredString, Colorize};

const RULE_WIDTH: usize = 60;

fn tagged(tag: ColoredString, msg: &str) {
    println!("{} {}", tag, msg);
}

pub fn print_success(msg: &str) {
    tagged("[OK]".green().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERR]".red().bold(), msg);
}

pub fn print_warning(msg: &str) {
    tagged("[WARN]".yellow().bold(), msg);
}

pub fn print_info(msg: &str) {
    tagged("[*]".blue().bold(), msg);
}

/// 已存在、无需处理的项目
pub fn print_skip(msg: &str) {
    tagged("[SKIP]".dimmed(), msg);
}

pub fn print_done(msg: &str) {
    tagged("[DONE]".green().bold(), msg);
}

/// `[OK] 来源 -> 目标文件`
pub fn print_conversion(from: &str, to: &str) {
    println!(
        "{} {} {} {}",
        "[OK]".green().bold(),
        from.dimmed(),
        "->".cyan(),
        to
    );
}

/// 总能量：eV 保留 6 位，Ry 保留 8 位
pub fn print_energy(label: &str, energy_ev: f64, energy_ry: f64) {
    tagged(
        "[E]".cyan().bold(),
        &format!(
            "{}: {} eV ({:.8} Ry)",
            label,
            format!("{:.6}", energy_ev).bold(),
            energy_ry
        ),
    );
}

/// 表面能同时给出 eV/Å² 与 J/m²
pub fn print_surface_energy(ev_per_a2: f64, j_per_m2: f64) {
    tagged(
        "[OK]".green().bold(),
        &format!(
            "Surface energy: {} eV/Å² ({:.4} J/m²)",
            format!("{:.6}", ev_per_a2).bold(),
            j_per_m2
        ),
    );
}

pub fn print_header(title: &str) {
    let line = "─".repeat(RULE_WIDTH);
    println!("\n{}", line.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", line.dimmed());
}

pub fn print_separator() {
    println!("{}", "─".repeat(RULE_WIDTH).dimmed());
}
