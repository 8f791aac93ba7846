pub mod fifo_heap;
pub mod indent;
