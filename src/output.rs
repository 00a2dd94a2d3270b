use owo_colors::OwoColorize;

/// Prefix for all console output
const BOOKS: &str = "📚";

/// Print a startup banner
pub fn startup_banner(version: &str) {
    println!();
    println!("{}", "═".repeat(50).bright_cyan());
    println!(
        "{}  {} {}",
        BOOKS,
        "ASRR AGENT SERVER".bright_cyan().bold(),
        format!("- v{}", version).bright_white()
    );
    println!("{}", "═".repeat(50).bright_cyan());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!(
        "{}  {}",
        "─".repeat(3).bright_white().dimmed(),
        title.bright_white().bold()
    );
}

/// Print configuration info
pub fn config_item(key: &str, value: &str) {
    println!(
        "{} {} {}",
        BOOKS,
        format!("{}:", key).bright_white(),
        value.bright_cyan()
    );
}

/// Print a startup failure (red)
pub fn startup_error(message: &str) {
    eprintln!();
    eprintln!("{} {}", BOOKS, message.red());
}

/// Print server ready message with a nice box
pub fn server_ready(port: u16, web: bool) {
    println!();
    println!("{}", "┌─────────────────────────────────────────┐".green());
    println!(
        "{}  {} Listening on {}",
        "│".green(),
        BOOKS,
        format!("0.0.0.0:{}", port).green().bold()
    );
    if web {
        println!(
            "{}  🌐 Web UI: {}",
            "│".green(),
            format!("http://localhost:{}/dev-ui/", port).bright_white().bold()
        );
    }
    println!("{}", "└─────────────────────────────────────────┘".green());
    println!();
}
