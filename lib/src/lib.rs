pub mod archive;
pub mod format;
pub mod util;
