pub mod general;
pub mod parser;

pub use general::help;
pub use parser::BiasCommand;
