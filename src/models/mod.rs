//! Domain model module declarations.

pub mod lesson;
pub mod result;
pub mod session;
