pub mod backoff;
pub mod shared_cell;
