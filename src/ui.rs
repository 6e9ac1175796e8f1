//! Terminal output helpers for the CLI.

use colored::*;

const RULE_WIDTH: usize = 60;

pub fn print_header(provider: &str, model: &str) {
    let line = "─".repeat(RULE_WIDTH);
    println!("{}", line.black().bold());

    let name = "parley".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}", name, version);

    let info = format!("  {}  •  {}", provider, model).cyan();
    println!("{}", info);

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

/// A configured/missing marker for status output.
pub fn key_status(value: &str) -> ColoredString {
    if value.is_empty() {
        "not set".red()
    } else {
        "✓".green().bold()
    }
}
