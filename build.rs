fn main() {
    // git HEADが変わったら再ビルド
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let output = std::process::Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags"])
        .output();

    // gitが無い環境（tarball等）ではパッケージバージョンを使う
    let version = match output {
        Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).trim().to_string(),
        _ => std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_string()),
    };

    println!("cargo:rustc-env=AUTOBONE_VERSION={}", version);
}
