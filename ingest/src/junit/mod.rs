pub mod capture;
mod case;
pub mod codec;
pub mod date_parser;
pub mod diagnostics;
pub mod parser;
pub mod record;
pub mod rules;
mod suite;
