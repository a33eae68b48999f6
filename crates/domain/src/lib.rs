//! 实时消息核心领域模型
//!
//! 包含消息、群组、表情回应等实体，以及存储适配器契约。

pub mod errors;
pub mod group;
pub mod message;
pub mod reaction;
pub mod repository;
pub mod user;
pub mod value_objects;

pub use errors::*;
pub use group::*;
pub use message::*;
pub use reaction::*;
pub use repository::*;
pub use user::*;
pub use value_objects::*;
