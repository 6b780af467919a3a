use std::path::PathBuf;

// Fixed system locations; dev mode overrides these through DevMode.

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/punchguard/punchguard.toml")
}

pub fn system_models_dir() -> PathBuf {
    PathBuf::from("/usr/share/punchguard/models")
}
