//! Type model

pub mod type_system;

pub use type_system::{ClassId, ClassInfo, ClassTable, Member, MemberKind, Type, STRING_METHODS};
