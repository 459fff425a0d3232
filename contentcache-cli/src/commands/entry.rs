//! Entry CLI commands: get, put, remove and remove-context.
//!
//! Each invocation opens the cache, performs one operation and closes it, so
//! pending disk writes are applied before the process exits. A fresh process
//! starts with an empty memory tier, which means `remove-context` only sees
//! ids loaded during the same invocation.

use std::time::Duration;

use crate::commands::common::{open_cache, GlobalOptions};
use crate::error::CliError;

/// Print the value stored for `(context, id)`.
pub fn run_get(options: &GlobalOptions, context: &str, id: &str) -> Result<(), CliError> {
    let cache = open_cache(options)?;
    let value = cache.get(context, id);
    cache.close();

    match value {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => Err(CliError::NotFound {
            context: context.to_string(),
            id: id.to_string(),
        }),
    }
}

/// Store `value` for `(context, id)`.
pub fn run_put(
    options: &GlobalOptions,
    context: &str,
    id: &str,
    value: &str,
    ttl_secs: Option<u64>,
) -> Result<(), CliError> {
    let cache = open_cache(options)?;
    match ttl_secs {
        Some(secs) => cache.put_with_ttl(context, id, value.to_string(), Duration::from_secs(secs)),
        None => cache.put(context, id, value.to_string()),
    }
    cache.close();

    match ttl_secs {
        Some(secs) => println!("Stored {}/{} (expires in {}s)", context, id, secs),
        None => println!("Stored {}/{}", context, id),
    }
    Ok(())
}

/// Remove `(context, id)` from both tiers.
pub fn run_remove(options: &GlobalOptions, context: &str, id: &str) -> Result<(), CliError> {
    let cache = open_cache(options)?;
    cache.remove(context, id);
    cache.close();

    println!("Removed {}/{}", context, id);
    Ok(())
}

/// Remove every memory-resident id of `context`.
pub fn run_remove_context(options: &GlobalOptions, context: &str) -> Result<(), CliError> {
    let cache = open_cache(options)?;
    let removed = cache.remove_context(context);
    cache.close();

    println!("Removed {} entries from context '{}'", removed.len(), context);
    Ok(())
}
