//! The `version` command.

pub fn run() {
    println!("vmprobe {}", env!("CARGO_PKG_VERSION"));
}
