/// Display version information
pub fn execute() {
    println!("spqf {}", env!("CARGO_PKG_VERSION"));
    println!("Channel governance: votes, deadlines and the vote archive");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_execute() {
        // Version command should not panic
        execute();
    }
}
