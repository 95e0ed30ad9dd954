//! Track catalog database

pub mod init;

pub use init::*;
