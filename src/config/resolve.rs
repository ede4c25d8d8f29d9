pub fn resolve_vector_cache_max_objects() -> i64 {
    resolve_i64(
        "--vector-cache-max-objects",
        "VECTOR_CACHE_MAX_OBJECTS",
        super::DEFAULT_VECTOR_CACHE_MAX_OBJECTS,
    )
}

pub fn resolve_prefill_cache_on_startup() -> bool {
    resolve_bool("--prefill-cache-on-startup", "PREFILL_CACHE_ON_STARTUP", true)
}

// Helpers

fn cli_arg(flag: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let idx = args.iter().position(|arg| arg == flag)?;
    args.get(idx + 1).cloned()
}

fn resolve_i64(flag: &str, env: &str, default: i64) -> i64 {
    if let Some(val_str) = cli_arg(flag) {
        if let Ok(v) = val_str.parse::<i64>() {
            return v;
        }
    }
    if let Ok(val_str) = std::env::var(env) {
        if let Ok(v) = val_str.parse::<i64>() {
            return v;
        }
    }
    default
}

fn resolve_bool(flag: &str, env: &str, default: bool) -> bool {
    if let Some(val_str) = cli_arg(flag) {
        if let Some(v) = parse_bool(&val_str) {
            return v;
        }
    }
    if let Ok(val_str) = std::env::var(env) {
        if let Some(v) = parse_bool(&val_str) {
            return v;
        }
    }
    default
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
