// Adapters: concrete implementations of the domain ports and file formats.

pub mod catalog;
pub mod http;
pub mod storage;
pub mod table;
