/// Display version information
pub fn execute() {
    println!("{}", version_line());
    println!("Contribution attestation for content-addressed ledgers");
}

fn version_line() -> String {
    format!("attestor {}", env!("CARGO_PKG_VERSION"))
}
