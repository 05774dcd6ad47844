pub mod log_store;
#[cfg(test)]
pub mod memory_source;
pub mod object_source;
pub mod s3_source;
