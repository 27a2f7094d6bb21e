pub mod init;
pub mod source;
pub mod ingest;
pub mod extract;
pub mod cluster;
pub mod summaries;
pub mod brief;
