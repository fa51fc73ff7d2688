fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let described = std::process::Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());

    let pkg = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let version = match described {
        Some(git) if !git.is_empty() => format!("{} ({})", pkg, git),
        _ => pkg,
    };

    println!("cargo:rustc-env=AVATAR_BUILD_VERSION={}", version);
}
