//! Build script for SweetLife
//!
//! Bumps a persistent build counter and embeds build metadata for the status tool.

use std::fs;
use std::path::Path;

const BUILD_NUMBER_FILE: &str = "build_number.txt";

fn read_build_number(path: &Path) -> u64 {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

fn main() {
    // Only rerun when sources change
    println!("cargo:rerun-if-changed=src");

    let counter_path = Path::new(BUILD_NUMBER_FILE);
    let build_number = read_build_number(counter_path) + 1;

    fs::write(counter_path, build_number.to_string())
        .expect("Failed to write build number file");

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=SWEETLIFE_BUILD_NUMBER={}", build_number);
    println!("cargo:rustc-env=SWEETLIFE_BUILD_TIMESTAMP={}", timestamp);
    println!("cargo:rustc-env=SWEETLIFE_BUILD_PROFILE={}", profile);
}
