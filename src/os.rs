//! Host and process introspection helpers.

use std::net::UdpSocket;
use std::path::Path;

/// Coarse OS family name.
pub fn family() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "mac"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unix"
    }
}

/// Hostname of the machine, or `"unknown"` when it cannot be determined.
pub fn system_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// First non-loopback IPv4 address of the machine.
///
/// Determined by opening a UDP socket towards a public address and reading
/// the local endpoint; no packet is sent. Returns `"unknown"` when the
/// machine has no usable interface.
pub fn system_address() -> String {
    let probe = || -> Option<String> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:53").ok()?;
        let addr = socket.local_addr().ok()?;
        if addr.ip().is_loopback() {
            return None;
        }
        Some(addr.ip().to_string())
    };
    probe().unwrap_or_else(|| "unknown".to_string())
}

/// Role of the current process, derived from the executable name.
///
/// Service binaries are named `legion-<role>`; the last `-`-separated
/// segment is the role. Falls back to `"legion"` when the executable name
/// cannot be read.
pub fn service_role() -> String {
    std::env::current_exe()
        .ok()
        .as_deref()
        .and_then(Path::file_stem)
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.split('-').next_back())
        .map(str::to_string)
        .unwrap_or_else(|| "legion".to_string())
}
