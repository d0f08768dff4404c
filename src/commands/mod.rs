//! CLI command handlers

pub mod list;
pub mod login;
pub mod parser;
pub mod port;
pub mod start;
pub mod stop;
pub mod submit;

pub use parser::*;

use colored::Colorize;

pub fn print_success(message: impl AsRef<str>) {
    println!("{}{}", "Success: ".green(), message.as_ref());
}

pub fn print_error(message: impl AsRef<str>) {
    println!("{}{}", "ERROR: ".red(), message.as_ref());
}

pub fn print_warning(message: impl AsRef<str>) {
    println!("{}{}", "Warn: ".yellow(), message.as_ref());
}
