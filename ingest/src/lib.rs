pub mod junit;
pub mod string_safety;
