pub mod arena;
pub use arena::Arena;
