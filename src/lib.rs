pub mod disk;
pub mod fs;
pub mod shell;
pub mod utils;
