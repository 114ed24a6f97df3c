pub mod model;
pub mod package;
pub mod parts;
pub mod tree;
pub mod xml;
