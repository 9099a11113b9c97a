use anyhow::Result;
use std::fs;
use std::path::Path;

pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    let log_file_name = format!("checkin_monitor_{}.log", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);
    let log_file = fern::log_file(&log_path)?;

    // Only the file just opened survives
    cleanup_old_logs(log_dir, &log_path)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()?;

    Ok(())
}

pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}

fn cleanup_old_logs(log_dir: &Path, keep: &Path) -> Result<()> {
    let stale = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "log") && path != keep);

    for path in stale {
        if let Err(e) = fs::remove_file(&path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_only_current_log() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["old.log", "older.log"] {
            fs::write(dir.path().join(name), "previous run").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let current = dir.path().join("newest.log");
        let _file = fern::log_file(&current).unwrap();

        cleanup_old_logs(dir.path(), &current).unwrap();

        let mut left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(left, vec!["newest.log", "notes.txt"]);
    }

    #[test]
    fn test_parse_level_defaults_to_info() {
        assert_eq!(parse_level("TRACE"), log::LevelFilter::Trace);
        assert_eq!(parse_level("warn"), log::LevelFilter::Warn);
        assert_eq!(parse_level("fatal"), log::LevelFilter::Info);
    }
}
