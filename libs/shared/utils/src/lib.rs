pub mod pagination;
pub mod test_utils;
