pub mod backup;
pub mod catalog;
pub mod config;
pub mod console;
pub mod install;
pub mod session;
pub mod supervisor;
