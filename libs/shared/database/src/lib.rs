pub mod sqlite;
pub mod supabase;

pub use sqlite::{Database, DatabaseError};
