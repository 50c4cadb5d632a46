pub mod element;
pub mod stream;
