pub mod walk;

pub use walk::{scan_account, scan_accounts, slash_path, ScanOutput};
