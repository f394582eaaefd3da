pub mod layout;
pub mod qc;
pub mod reader;
pub mod writer;

pub use layout::FORMAT_VERSION;
pub use reader::parse_batch_file;
pub use writer::{write_to_path, BatchSerializer};
