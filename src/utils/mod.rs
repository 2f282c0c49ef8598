mod node;
pub use node::{Color, NIL, Node};
