//! Cache management CLI commands.

use contentcache::config::format_size;
use contentcache::DiskPhase;

use crate::commands::common::{open_cache, GlobalOptions};
use crate::error::CliError;

/// Show disk cache statistics.
pub fn run_stats(options: &GlobalOptions) -> Result<(), CliError> {
    let cache = open_cache(options)?;
    let phase = cache.await_ready();

    println!("Disk cache: {}", cache.directory().display());
    println!("  State:    {}", describe(phase));
    println!("  Capacity: {}", format_size(cache.capacity()));
    println!("  Size:     {}", format_size(cache.size()));

    cache.close();
    Ok(())
}

/// Clear both tiers, removing every cached entry.
pub fn run_clear(options: &GlobalOptions) -> Result<(), CliError> {
    let cache = open_cache(options)?;
    cache.await_ready();
    let freed = cache.size();

    println!("Clearing disk cache at: {}", cache.directory().display());
    cache.clear();
    cache.close();

    println!("Freed {}", format_size(freed));
    Ok(())
}

fn describe(phase: DiskPhase) -> &'static str {
    match phase {
        DiskPhase::Uninitialized | DiskPhase::Initializing => "initializing",
        DiskPhase::Ready => "ready",
        DiskPhase::Unavailable => "unavailable (memory only)",
        DiskPhase::Closed => "closed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::common::options_for_dir;
    use crate::commands::entry::{run_get, run_put};

    #[test]
    fn test_stats_on_empty_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        run_stats(&options_for_dir(temp_dir.path())).unwrap();
    }

    #[test]
    fn test_clear_removes_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let options = options_for_dir(temp_dir.path());

        run_put(&options, "session", "user42", "Ann", None).unwrap();
        run_clear(&options).unwrap();

        assert!(matches!(
            run_get(&options, "session", "user42"),
            Err(CliError::NotFound { .. })
        ));
    }

    #[test]
    fn test_stats_and_clear_keep_unrelated_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let notes = temp_dir.path().join("notes.txt");
        std::fs::write(&notes, b"keep me").unwrap();
        let options = options_for_dir(temp_dir.path());

        run_stats(&options).unwrap();
        run_put(&options, "session", "user42", "Ann", None).unwrap();
        run_clear(&options).unwrap();

        assert_eq!(std::fs::read(&notes).unwrap(), b"keep me");
    }

    #[test]
    fn test_describe_phase() {
        assert_eq!(describe(DiskPhase::Ready), "ready");
        assert_eq!(describe(DiskPhase::Unavailable), "unavailable (memory only)");
    }
}
