use colored::{ColoredString, Colorize};
use log::Level;

/// Workspace crates log at info and above; dependencies only surface
/// warnings and errors.
pub fn init_logger() {
    fern::Dispatch::new()
        .format(|out, message, record| {
            let krate = record.target().split("::").next().unwrap_or("");
            let tag = match local_tag(record.target()) {
                Some(local) => local.cyan(),
                None => krate.dimmed(),
            };

            out.finish(format_args!(
                "{} {} [{}] {}",
                chrono::Local::now()
                    .format("%H:%M:%S")
                    .to_string()
                    .dimmed(),
                paint_level(record.level()),
                tag,
                message
            ))
        })
        .filter(|meta| match local_tag(meta.target()) {
            Some(_) => meta.level() <= Level::Info,
            None => meta.level() <= Level::Warn,
        })
        .chain(std::io::stdout())
        .apply()
        .expect("logger installs once")
}

fn local_tag(target: &str) -> Option<&'static str> {
    match target.split("::").next().unwrap_or(target) {
        "waveband" => Some("main"),
        "waveband_core" => Some("core"),
        "waveband_server" => Some("server"),
        _ => None,
    }
}

fn paint_level(level: Level) -> ColoredString {
    match level {
        Level::Error => "error".red().bold(),
        Level::Warn => "warn".yellow().bold(),
        Level::Info => "info".green(),
        Level::Debug => "debug".blue(),
        Level::Trace => "trace".dimmed(),
    }
}
