//! Stamps the shelf-sentinel binaries with the commit they were built from
//!
//! `main` logs `GIT_HASH` next to the package version at startup, so a
//! deployed server's log identifies the exact build. Outside a git checkout
//! (source tarballs, vendored builds) the hash reads "unknown".

use std::process::Command;

fn short_commit() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

fn main() {
    let git_hash = short_commit().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=GIT_HASH={git_hash}");

    // New commits and branch switches both move HEAD
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
