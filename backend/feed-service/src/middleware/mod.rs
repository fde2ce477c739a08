pub mod identity;

pub use identity::{AuthContext, USER_ID_HEADER};
