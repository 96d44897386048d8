pub mod history;
pub mod ingest;
pub mod keys;
pub mod scan;

pub use history::{run_history_list, run_history_show};
pub use ingest::run_ingest;
pub use keys::{run_decrypt, run_encrypt, run_keygen};
pub use scan::run_scan;
