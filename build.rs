use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

/// Optional site/release tag appended to the version, e.g. `LABPLAN_RELEASE=lab2`.
const RELEASE_ENV: &str = "LABPLAN_RELEASE";

fn display_version() -> String {
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    match env::var(RELEASE_ENV).map(|tag| tag.trim().to_string()) {
        Ok(tag) if !tag.is_empty() => format!("{version}-{tag} ({profile})"),
        _ => format!("{version} ({profile})"),
    }
}

fn main() {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    println!("cargo:rerun-if-env-changed={RELEASE_ENV}");
    for path in ["build.rs", "Cargo.toml", "src", "crates"] {
        println!("cargo:rerun-if-changed={path}");
    }
    println!("cargo:rustc-env=LABPLAN_BUILD_N={n}");
    println!("cargo:rustc-env=LABPLAN_DISPLAY_VERSION={}", display_version());
}
