pub mod object_put;
pub use self::object_put::PutObject;
