pub mod element;
pub mod extra_field;
