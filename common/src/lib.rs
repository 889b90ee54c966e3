pub mod shutdown;

/// Namespace label carrying the owning account. An absent or empty value
/// means the namespace belongs to no account.
pub mod labels {
    pub const ACCOUNT: &str = "tenancy.arbor.dev/account";
}

/// Process-wide init: color handling for log output.
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
}

/// Marks the container ready for the kubelet's readiness probe.
pub fn signal_ready() {
    if let Err(e) = std::fs::write("/etc/ready", "ready") {
        eprintln!("failed to write readiness file: {e}");
    }
}
