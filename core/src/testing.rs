pub mod probe;
pub mod record;
pub mod runner;
pub mod session;
pub mod summary;
pub mod testcase;
pub mod verdict;

pub use record::*;
pub use runner::*;
pub use session::*;
pub use summary::*;
pub use testcase::*;
pub use verdict::*;
