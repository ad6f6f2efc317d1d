//! Supporting utilities that are not part of the engine proper.

pub mod testing;
