//! Runtime components: resolution, installation, supervision

pub mod installer;
pub mod resolver;
pub mod supervisor;
pub mod terminate;

pub use installer::*;
pub use resolver::*;
pub use supervisor::*;
pub use terminate::terminate_tree;
